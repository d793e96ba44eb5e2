use serde::{Deserialize, Deserializer, Serialize};
use chrono::{DateTime, Utc};

use crate::{
    models::{
        reaction::{ReactionState, ReactionSummary},
        user::UserSummary,
    },
    utils::serde_helpers::flexible_id,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: String,
    pub author: Option<UserSummary>,
    pub content: String,
    pub comment_count: u64,
    pub reactions: ReactionState,
    pub created_at: DateTime<Utc>,
}

/// 后端帖子结构：表态字段平铺在帖子上，或嵌套在 `reactions` 下
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    #[serde(with = "flexible_id", alias = "_id")]
    id: String,
    #[serde(default, alias = "user")]
    author: Option<UserSummary>,
    #[serde(default)]
    content: String,
    #[serde(default, alias = "commentsCount", alias = "comment_count")]
    comment_count: u64,
    #[serde(default)]
    reactions: Option<ReactionSummary>,
    #[serde(flatten)]
    flat_reactions: ReactionSummary,
    #[serde(alias = "created_at")]
    created_at: DateTime<Utc>,
}

impl<'de> Deserialize<'de> for Post {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let record = PostRecord::deserialize(deserializer)?;
        let summary = record.reactions.unwrap_or(record.flat_reactions);

        Ok(Post {
            id: record.id,
            author: record.author,
            content: record.content,
            comment_count: record.comment_count,
            reactions: ReactionState::from(summary),
            created_at: record.created_at,
        })
    }
}
