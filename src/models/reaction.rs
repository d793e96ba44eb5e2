use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Like,
    Love,
    Haha,
    Wow,
    Sad,
    Angry,
}

impl ReactionType {
    pub const ALL: [ReactionType; 6] = [
        ReactionType::Like,
        ReactionType::Love,
        ReactionType::Haha,
        ReactionType::Wow,
        ReactionType::Sad,
        ReactionType::Angry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionType::Like => "like",
            ReactionType::Love => "love",
            ReactionType::Haha => "haha",
            ReactionType::Wow => "wow",
            ReactionType::Sad => "sad",
            ReactionType::Angry => "angry",
        }
    }
}

impl FromStr for ReactionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReactionType::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AppError::ValidationFailure(format!("未知的表态类型: {}", s)))
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 当前用户对一篇帖子的表态状态
///
/// `total_count` 始终等于 `counts_by_type` 各项之和，计数为 0 的类型不保留在表中。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionState {
    pub current_reaction: Option<ReactionType>,
    pub counts_by_type: BTreeMap<ReactionType, u64>,
    pub total_count: u64,
}

impl ReactionState {
    /// 丢弃零计数；视图者的表态若未计入则补记一次
    pub fn new(current_reaction: Option<ReactionType>, counts_by_type: BTreeMap<ReactionType, u64>) -> Self {
        let mut counts_by_type: BTreeMap<_, _> = counts_by_type
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .collect();
        if let Some(reaction) = current_reaction {
            counts_by_type.entry(reaction).or_insert(1);
        }
        let total_count = counts_by_type.values().sum();

        Self {
            current_reaction,
            counts_by_type,
            total_count,
        }
    }

    /// 切换表态，返回新的状态；不修改自身
    ///
    /// 同类型再次点击取消；换类型时总数不变；首次表态总数加一。
    pub fn toggled(&self, reaction: ReactionType) -> Self {
        let mut next = self.clone();

        if let Some(previous) = next.current_reaction.take() {
            next.decrement(previous);
            if previous == reaction {
                return next;
            }
        }

        *next.counts_by_type.entry(reaction).or_insert(0) += 1;
        next.total_count += 1;
        next.current_reaction = Some(reaction);
        next
    }

    fn decrement(&mut self, reaction: ReactionType) {
        let Some(count) = self.counts_by_type.get_mut(&reaction) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.counts_by_type.remove(&reaction);
        }
        self.total_count = self.total_count.saturating_sub(1);
    }

    pub fn count(&self, reaction: ReactionType) -> u64 {
        self.counts_by_type.get(&reaction).copied().unwrap_or(0)
    }

    pub fn is_consistent(&self) -> bool {
        let sum: u64 = self.counts_by_type.values().sum();
        let current_counted = self
            .current_reaction
            .map(|r| self.count(r) > 0)
            .unwrap_or(true);

        sum == self.total_count && current_counted && self.counts_by_type.values().all(|c| *c > 0)
    }
}

/// 后端返回的表态汇总；不同接口字段名不同
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    #[serde(
        default,
        alias = "currentReaction",
        alias = "myReaction",
        alias = "user_reaction",
        deserialize_with = "known_reaction"
    )]
    pub user_reaction: Option<ReactionType>,
    #[serde(
        default,
        alias = "reactionCounts",
        alias = "countsByType",
        alias = "reaction_counts",
        deserialize_with = "known_counts"
    )]
    pub counts: BTreeMap<ReactionType, u64>,
    #[serde(default, alias = "totalCount", alias = "totalReactions", alias = "total_count")]
    pub total: Option<u64>,
}

// 后端新增的表态类型客户端不认识时忽略，不让整页解析失败
fn known_reaction<'de, D>(deserializer: D) -> Result<Option<ReactionType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|name| match name.parse() {
        Ok(reaction) => Some(reaction),
        Err(_) => {
            tracing::debug!("Ignoring unknown viewer reaction {}", name);
            None
        }
    }))
}

fn known_counts<'de, D>(deserializer: D) -> Result<BTreeMap<ReactionType, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, u64>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, count)| match name.parse::<ReactionType>() {
            Ok(reaction) => Some((reaction, count)),
            Err(_) => {
                tracing::debug!("Ignoring {} reactions of unknown type {}", count, name);
                None
            }
        })
        .collect())
}

impl From<ReactionSummary> for ReactionState {
    // 总数以各类型之和为准，服务端的 total 只用于日志比对
    fn from(summary: ReactionSummary) -> Self {
        let state = ReactionState::new(summary.user_reaction, summary.counts);
        if let Some(total) = summary.total {
            if total != state.total_count {
                tracing::debug!(
                    "Server reaction total {} differs from per-type sum {}",
                    total,
                    state.total_count
                );
            }
        }
        state
    }
}

/// 切换表态请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleReactionRequest {
    #[serde(rename = "type")]
    pub reaction_type: ReactionType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_toggle_scenario_like_love_love() {
        let start = ReactionState::default();

        let liked = start.toggled(ReactionType::Like);
        assert_eq!(liked.current_reaction, Some(ReactionType::Like));
        assert_eq!(liked.total_count, 1);
        assert_eq!(liked.counts_by_type, BTreeMap::from([(ReactionType::Like, 1)]));

        let loved = liked.toggled(ReactionType::Love);
        assert_eq!(loved.current_reaction, Some(ReactionType::Love));
        assert_eq!(loved.total_count, 1);
        assert_eq!(loved.counts_by_type, BTreeMap::from([(ReactionType::Love, 1)]));

        let cleared = loved.toggled(ReactionType::Love);
        assert_eq!(cleared.current_reaction, None);
        assert_eq!(cleared.total_count, 0);
        assert!(cleared.counts_by_type.is_empty());
    }

    #[test]
    fn test_toggle_keeps_other_viewers_counts() {
        let state = ReactionState::new(
            None,
            BTreeMap::from([(ReactionType::Like, 3), (ReactionType::Wow, 1)]),
        );
        assert_eq!(state.total_count, 4);

        let next = state.toggled(ReactionType::Wow);
        assert_eq!(next.count(ReactionType::Wow), 2);
        assert_eq!(next.count(ReactionType::Like), 3);
        assert_eq!(next.total_count, 5);

        let moved = next.toggled(ReactionType::Like);
        assert_eq!(moved.count(ReactionType::Wow), 1);
        assert_eq!(moved.count(ReactionType::Like), 4);
        assert_eq!(moved.total_count, 5);
        assert!(moved.is_consistent());
    }

    #[test]
    fn test_summary_conversion_drops_zero_counts() {
        let summary: ReactionSummary = serde_json::from_value(json!({
            "currentReaction": "haha",
            "reactionCounts": { "haha": 2, "sad": 0 },
            "totalReactions": 2
        }))
        .unwrap();
        let state = ReactionState::from(summary);

        assert_eq!(state.current_reaction, Some(ReactionType::Haha));
        assert_eq!(state.counts_by_type, BTreeMap::from([(ReactionType::Haha, 2)]));
        assert_eq!(state.total_count, 2);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_viewer_reaction_missing_from_counts_is_counted() {
        let summary: ReactionSummary = serde_json::from_value(json!({
            "currentReaction": "like",
            "reactionCounts": { "love": 2 }
        }))
        .unwrap();
        let state = ReactionState::from(summary);
        assert_eq!(state.count(ReactionType::Like), 1);
        assert_eq!(state.total_count, 3);
        assert!(state.is_consistent());

        let cleared = state.toggled(ReactionType::Like);
        assert_eq!(cleared.current_reaction, None);
        assert_eq!(cleared.counts_by_type, BTreeMap::from([(ReactionType::Love, 2)]));
        assert_eq!(cleared.total_count, 2);
    }

    #[test]
    fn test_toggle_off_uncounted_reaction_keeps_total() {
        let state = ReactionState {
            current_reaction: Some(ReactionType::Like),
            counts_by_type: BTreeMap::from([(ReactionType::Love, 2)]),
            total_count: 2,
        };
        let next = state.toggled(ReactionType::Like);
        assert_eq!(next.total_count, 2);
        assert!(next.is_consistent());
    }

    #[test]
    fn test_unknown_reaction_types_are_ignored() {
        let summary: ReactionSummary = serde_json::from_value(json!({
            "myReaction": "celebrate",
            "countsByType": { "like": 1, "celebrate": 4 },
            "totalCount": 5
        }))
        .unwrap();
        assert_eq!(summary.user_reaction, None);
        assert_eq!(summary.counts, BTreeMap::from([(ReactionType::Like, 1)]));

        let state = ReactionState::from(summary);
        assert_eq!(state.total_count, 1);
    }

    #[test]
    fn test_request_body_uses_type_field() {
        let body = serde_json::to_value(ToggleReactionRequest {
            reaction_type: ReactionType::Angry,
        })
        .unwrap();
        assert_eq!(body, json!({ "type": "angry" }));
    }
}
