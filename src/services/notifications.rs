use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::ServiceError;
use crate::models::notifications::{
    NewNotification, Notification, NotificationScope, NotificationView,
};
use crate::models::users::{Role, User, UserSummary};
use crate::models::ListParams;
use crate::repositories::{Filter, Repository, Store};

pub struct NotificationService {
    notifications: Repository<Notification>,
    users: Repository<User>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        NotificationService {
            notifications: Repository::new(store.clone()),
            users: Repository::new(store),
        }
    }

    pub async fn create(&self, new: NewNotification) -> Result<Notification, ServiceError> {
        if new.scope == NotificationScope::User && new.user_id.is_none() {
            return Err(ServiceError::Internal(
                "User notifications need a recipient".to_string(),
            ));
        }

        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            title: new.title,
            message: new.message,
            scope: new.scope,
            user_id: new.user_id,
            object_id: new.object_id,
            environment: new.environment,
            read: false,
            created_at: now,
            updated_at: now,
        };

        self.notifications.insert(&notification).await?;
        Ok(notification)
    }

    /// Like `create`, for side effects of another operation that must not
    /// fail because of the notification.
    pub async fn notify(&self, new: NewNotification) {
        let title = new.title.clone();
        if let Err(e) = self.create(new).await {
            log::error!("Could not store notification \"{}\": {}", title, e);
        }
    }

    /// Users see their own and broadcast notifications; administrators also
    /// see those addressed to staff.
    fn visible_to(actor: &User) -> Filter {
        let mut visible = vec![
            Filter::eq("scope", NotificationScope::All),
            Filter::eq("scope", NotificationScope::User).and(Filter::eq("userId", actor.id)),
        ];
        if actor.role >= Role::Admin {
            visible.push(Filter::eq("scope", NotificationScope::Admin));
        }
        Filter::any(visible)
    }

    fn list_filter(actor: &User, params: &ListParams) -> Filter {
        let filter = Self::visible_to(actor);
        match params.environment {
            Some(environment) => filter.and(Filter::eq("environment", environment)),
            None => filter,
        }
    }

    async fn attach_recipients(
        &self,
        notifications: Vec<Notification>,
    ) -> Result<Vec<NotificationView>, ServiceError> {
        let users = self
            .users
            .populate(notifications.iter().filter_map(|n| n.user_id))
            .await?;

        Ok(notifications
            .into_iter()
            .map(|notification| NotificationView {
                user: notification
                    .user_id
                    .and_then(|id| users.get(&id))
                    .map(UserSummary::from),
                notification,
            })
            .collect())
    }

    pub async fn fetch_all(
        &self,
        actor: &User,
        params: &ListParams,
    ) -> Result<Vec<NotificationView>, ServiceError> {
        let notifications = self
            .notifications
            .query(Self::list_filter(actor, params))
            .newest_first()
            .skip(params.skip)
            .limit(params.limit)
            .all()
            .await?;

        self.attach_recipients(notifications).await
    }

    pub async fn count(&self, actor: &User, params: &ListParams) -> Result<u64, ServiceError> {
        Ok(self
            .notifications
            .query(Self::list_filter(actor, params))
            .count()
            .await?)
    }

    /// Flips the read flag of a notification the actor can see.
    pub async fn read(&self, id: &str, actor: &User) -> Result<NotificationView, ServiceError> {
        let not_found = || ServiceError::NotFound("Notification not found".to_string());
        let id = Uuid::parse_str(id).map_err(|_| not_found())?;

        let current = self
            .notifications
            .query(Filter::eq("id", id).and(Self::visible_to(actor)))
            .one()
            .await?
            .ok_or_else(not_found)?;

        let updated = self
            .notifications
            .transition(
                id,
                Filter::eq("read", current.read),
                json!({ "read": !current.read }),
            )
            .await?
            .ok_or_else(|| ServiceError::Conflict("Notification changed, retry".to_string()))?;

        let mut views = self.attach_recipients(vec![updated]).await?;
        views.pop().ok_or_else(not_found)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let not_found = || ServiceError::NotFound("Notification not found".to_string());
        let id = Uuid::parse_str(id).map_err(|_| not_found())?;

        if !self.notifications.delete(id).await? {
            return Err(not_found());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Environment;
    use crate::services::testing;

    #[tokio::test]
    async fn user_scope_requires_a_recipient() {
        let (services, _, _mail) = testing::services();
        let result = services
            .notifications
            .create(NewNotification {
                title: "Hello".to_string(),
                message: "World".to_string(),
                scope: NotificationScope::User,
                user_id: None,
                object_id: None,
                environment: Environment::Live,
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Internal(_))));
    }

    #[tokio::test]
    async fn visibility_follows_scope_and_role() {
        let (services, store, _mail) = testing::services();
        let users = Repository::<User>::new(store);
        let alice = testing::user("alice");
        let bob = testing::user("bob");
        let mut admin = testing::user("admin");
        admin.role = Role::Admin;
        for user in [&alice, &bob, &admin] {
            users.insert(user).await.unwrap();
        }

        let notifications = &services.notifications;
        let object = Uuid::new_v4();
        notifications
            .create(NewNotification::for_user(alice.id, "Deposit", "approved".to_string(), object))
            .await
            .unwrap();
        notifications
            .create(NewNotification::for_admins("Deposit", "new".to_string(), object))
            .await
            .unwrap();
        notifications
            .create(
                NewNotification::for_admins("Demo", "demo".to_string(), object)
                    .in_environment(Environment::Demo),
            )
            .await
            .unwrap();

        let params = ListParams::default();
        let seen = notifications.fetch_all(&alice, &params).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].user.as_ref().unwrap().username, "alice");

        assert_eq!(notifications.count(&bob, &params).await.unwrap(), 0);
        assert_eq!(notifications.count(&admin, &params).await.unwrap(), 2);

        let demo_only = ListParams {
            environment: Some(Environment::Demo),
            ..Default::default()
        };
        assert_eq!(notifications.count(&admin, &demo_only).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn read_toggles_the_flag() {
        let (services, store, _mail) = testing::services();
        let alice = testing::user("alice");
        let bob = testing::user("bob");
        Repository::<User>::new(store).insert(&alice).await.unwrap();

        let created = services
            .notifications
            .create(NewNotification::for_user(
                alice.id,
                "Transfer",
                "received".to_string(),
                Uuid::new_v4(),
            ))
            .await
            .unwrap();
        let id = created.id.to_string();

        let read = services.notifications.read(&id, &alice).await.unwrap();
        assert!(read.notification.read);
        let unread = services.notifications.read(&id, &alice).await.unwrap();
        assert!(!unread.notification.read);

        let foreign = services.notifications.read(&id, &bob).await;
        assert!(matches!(foreign, Err(ServiceError::NotFound(_))));
    }
}
