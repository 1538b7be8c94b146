use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{users::UserSummary, Environment};
use crate::repositories::Document;
use crate::services::ServiceError;
use crate::validation::{Checks, Validate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationScope {
    User,
    Admin,
    All,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub scope: NotificationScope,
    /// Recipient; always set for `USER` notifications.
    pub user_id: Option<Uuid>,
    /// Record the notification is about (deposit, transfer, ...).
    pub object_id: Option<Uuid>,
    pub environment: Environment,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Notification {
    const COLLECTION: &'static str = "notifications";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub user: Option<UserSummary>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub scope: NotificationScope,
    pub user_id: Option<Uuid>,
    pub object_id: Option<Uuid>,
    #[serde(default)]
    pub environment: Environment,
}

impl NewNotification {
    pub fn for_user(user_id: Uuid, title: &str, message: String, object_id: Uuid) -> Self {
        NewNotification {
            title: title.to_string(),
            message,
            scope: NotificationScope::User,
            user_id: Some(user_id),
            object_id: Some(object_id),
            environment: Environment::Live,
        }
    }

    pub fn for_admins(title: &str, message: String, object_id: Uuid) -> Self {
        NewNotification {
            title: title.to_string(),
            message,
            scope: NotificationScope::Admin,
            user_id: None,
            object_id: Some(object_id),
            environment: Environment::Live,
        }
    }

    pub fn in_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

impl Validate for NewNotification {
    fn validate(&self) -> Result<(), ServiceError> {
        Checks::new()
            .required("title", &self.title)
            .required("message", &self.message)
            .finish()
    }
}
