use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::utils::serde_helpers::flexible_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(with = "flexible_id", alias = "_id")]
    pub id: String,
    #[serde(rename = "type", alias = "notificationType", alias = "notification_type")]
    pub notification_type: NotificationType,
    #[serde(default, alias = "data")]
    pub payload: serde_json::Value,
    #[serde(default, alias = "is_read", alias = "read")]
    pub is_read: bool,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    RegistrationReceived,
    RegistrationApproved,
    RegistrationRejected,
    RegistrationCancelled,
    EventUpdated,
    EventReminder,
    PostReaction,
    PostComment,
    System,
    #[serde(other)]
    Other,
}

/// 未读数接口的返回，字段名在不同版本中不一致
#[derive(Debug, Clone, Deserialize)]
pub struct UnreadCountResponse {
    #[serde(alias = "unreadCount", alias = "unread_count", alias = "total")]
    pub count: u64,
}

/// 通知列表加载状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Loading,
    Loaded,
    Error(String),
}
