use serde::{Deserialize, Serialize};

use crate::utils::serde_helpers::flexible_id;

/// 列表中嵌入的用户摘要（帖子作者、报名者）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(with = "flexible_id", alias = "_id")]
    pub id: String,
    #[serde(alias = "fullName", alias = "full_name", alias = "username")]
    pub name: String,
    #[serde(default, alias = "avatar", alias = "avatar_url")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Volunteer,
    Manager,
    Admin,
}
