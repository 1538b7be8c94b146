use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use super::ledger::{BalanceLedger, Movement};
use super::mail::Mailer;
use super::notifications::NotificationService;
use super::platform::PlatformService;
use super::{parse_id, ServiceError};
use crate::models::notifications::NewNotification;
use crate::models::transfers::{NewTransfer, Transfer, TransferStatus, TransferView};
use crate::models::users::{User, UserStatus, UserSummary};
use crate::models::{AccountType, ListParams};
use crate::repositories::{Filter, Repository, Store};

pub struct TransferService {
    transfers: Repository<Transfer>,
    users: Repository<User>,
    ledger: BalanceLedger,
    platform: Arc<PlatformService>,
    notifications: Arc<NotificationService>,
    mailer: Mailer,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: BalanceLedger,
        platform: Arc<PlatformService>,
        notifications: Arc<NotificationService>,
        mailer: Mailer,
    ) -> Self {
        TransferService {
            transfers: Repository::new(store.clone()),
            users: Repository::new(store),
            ledger,
            platform,
            notifications,
            mailer,
        }
    }

    async fn views(&self, transfers: Vec<Transfer>) -> Result<Vec<TransferView>, ServiceError> {
        let users = self
            .users
            .populate(transfers.iter().flat_map(|t| [t.sender_id, t.recipient_id]))
            .await?;

        Ok(transfers
            .into_iter()
            .map(|transfer| TransferView {
                sender: users.get(&transfer.sender_id).map(UserSummary::from),
                recipient: users.get(&transfer.recipient_id).map(UserSummary::from),
                transfer,
            })
            .collect())
    }

    async fn view(&self, transfer: Transfer) -> Result<TransferView, ServiceError> {
        self.views(vec![transfer])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Transfer not found".to_string()))
    }

    fn movements(transfer: &Transfer) -> Vec<Movement> {
        vec![
            Movement::debit(transfer.sender_id, transfer.account, transfer.total()),
            Movement::credit(transfer.recipient_id, AccountType::Main, transfer.amount),
        ]
    }

    async fn announce_success(&self, transfer: &Transfer) -> Result<(), ServiceError> {
        let mut users = self
            .users
            .populate([transfer.sender_id, transfer.recipient_id])
            .await?;

        if let Some(sender) = users.remove(&transfer.sender_id) {
            let message = format!("You sent {} to another member", transfer.amount);
            self.notifications
                .notify(NewNotification::for_user(
                    sender.id,
                    "Transfer sent",
                    message.clone(),
                    transfer.id,
                ))
                .await;
            self.mailer.send(&sender.email, "Transfer sent", message);
        }
        if let Some(recipient) = users.remove(&transfer.recipient_id) {
            let message = format!("You received {} from another member", transfer.amount);
            self.notifications
                .notify(NewNotification::for_user(
                    recipient.id,
                    "Transfer received",
                    message.clone(),
                    transfer.id,
                ))
                .await;
            self.mailer.send(&recipient.email, "Transfer received", message);
        }
        Ok(())
    }

    /// Sends funds to another member by username. Unless approval is
    /// required by the transfer settings, the transfer settles at once.
    pub async fn create(&self, actor: &User, new: NewTransfer) -> Result<TransferView, ServiceError> {
        let username = new.username.trim();
        if username == actor.username {
            return Err(ServiceError::BadRequest(
                "You cannot transfer funds to yourself".to_string(),
            ));
        }

        let recipient = self
            .users
            .query(Filter::eq("username", username))
            .one()
            .await?
            .ok_or_else(|| ServiceError::NotFound("Recipient not found".to_string()))?;
        if recipient.id == actor.id {
            return Err(ServiceError::BadRequest(
                "You cannot transfer funds to yourself".to_string(),
            ));
        }
        if recipient.status != UserStatus::Active {
            return Err(ServiceError::BadRequest(
                "Recipient account is not active".to_string(),
            ));
        }

        let settings = self.platform.transfer_settings().await?;
        let now = Utc::now();
        let transfer = Transfer {
            id: Uuid::new_v4(),
            sender_id: actor.id,
            recipient_id: recipient.id,
            amount: new.amount,
            fee: new.amount * settings.fee / Decimal::ONE_HUNDRED,
            account: new.account,
            status: TransferStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        if actor.balances.get(transfer.account) < transfer.total() {
            return Err(ServiceError::BadRequest("Insufficient balance".to_string()));
        }

        self.transfers.insert(&transfer).await?;
        log::info!(
            "User {} sent transfer {} of {} to {}",
            actor.id,
            transfer.id,
            transfer.amount,
            recipient.id
        );

        if settings.approval_required {
            self.notifications
                .notify(NewNotification::for_admins(
                    "New transfer",
                    format!(
                        "{} wants to send {} to {}",
                        actor.username, transfer.amount, recipient.username
                    ),
                    transfer.id,
                ))
                .await;
            return self.view(transfer).await;
        }

        let settled = self
            .ledger
            .settle(
                &self.transfers,
                transfer.id,
                TransferStatus::Pending,
                json!({ "status": TransferStatus::Successful }),
                &Self::movements(&transfer),
            )
            .await;

        match settled {
            Ok(settled) => {
                self.announce_success(&settled).await?;
                self.view(settled).await
            }
            Err(e) => {
                // Nothing moved, so the attempt leaves no trace.
                self.transfers
                    .delete_where(Filter::eq("id", transfer.id))
                    .await?;
                Err(e)
            }
        }
    }

    fn involving(actor: &User) -> Filter {
        Filter::any(vec![
            Filter::eq("senderId", actor.id),
            Filter::eq("recipientId", actor.id),
        ])
    }

    pub async fn fetch_all(
        &self,
        actor: &User,
        params: &ListParams,
    ) -> Result<Vec<TransferView>, ServiceError> {
        let transfers = self
            .transfers
            .query(Filter::All)
            .scoped(actor.is_staff(), Self::involving(actor))
            .newest_first()
            .skip(params.skip)
            .limit(params.limit)
            .all()
            .await?;
        self.views(transfers).await
    }

    pub async fn count(&self, actor: &User) -> Result<u64, ServiceError> {
        Ok(self
            .transfers
            .query(Filter::All)
            .scoped(actor.is_staff(), Self::involving(actor))
            .count()
            .await?)
    }

    async fn find(&self, actor: &User, id: &str) -> Result<Transfer, ServiceError> {
        let id = parse_id(id, "Transfer")?;
        self.transfers
            .query(Filter::eq("id", id))
            .scoped(actor.is_staff(), Self::involving(actor))
            .one()
            .await?
            .ok_or_else(|| ServiceError::NotFound("Transfer not found".to_string()))
    }

    pub async fn get(&self, actor: &User, id: &str) -> Result<TransferView, ServiceError> {
        let transfer = self.find(actor, id).await?;
        self.view(transfer).await
    }

    pub async fn update_status(
        &self,
        actor: &User,
        id: &str,
        status: TransferStatus,
    ) -> Result<TransferView, ServiceError> {
        let transfer = self.find(actor, id).await?;

        let movements = match status {
            TransferStatus::Successful => Self::movements(&transfer),
            TransferStatus::Reversed => vec![],
            TransferStatus::Pending => {
                return Err(ServiceError::BadRequest(
                    "status must be SUCCESSFUL or REVERSED".to_string(),
                ))
            }
        };

        let updated = self
            .ledger
            .settle(
                &self.transfers,
                transfer.id,
                TransferStatus::Pending,
                json!({ "status": status }),
                &movements,
            )
            .await?;
        log::info!("{} set transfer {} to {:?}", actor.id, transfer.id, status);

        if status == TransferStatus::Successful {
            self.announce_success(&updated).await?;
        } else if let Some(sender) = self
            .users
            .populate([transfer.sender_id])
            .await?
            .remove(&transfer.sender_id)
        {
            let message = format!("Your transfer of {} was reversed", transfer.amount);
            self.notifications
                .notify(NewNotification::for_user(
                    sender.id,
                    "Transfer reversed",
                    message.clone(),
                    transfer.id,
                ))
                .await;
            self.mailer.send(&sender.email, "Transfer reversed", message);
        }

        self.view(updated).await
    }
}
