use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    models::user::UserSummary,
    utils::serde_helpers::flexible_id,
};

/// 报名状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrationStatus::None => "none",
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// 报名相关动作：前两个由报名者发起，其余由活动负责人发起
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationAction {
    Register,
    Cancel,
    Approve { registration_id: String },
    Reject { registration_id: String, reason: String },
    Complete { registration_id: String },
}

impl RegistrationAction {
    pub fn name(&self) -> &'static str {
        match self {
            RegistrationAction::Register => "register",
            RegistrationAction::Cancel => "cancel",
            RegistrationAction::Approve { .. } => "approve",
            RegistrationAction::Reject { .. } => "reject",
            RegistrationAction::Complete { .. } => "complete",
        }
    }

    pub fn is_manager_action(&self) -> bool {
        !matches!(self, RegistrationAction::Register | RegistrationAction::Cancel)
    }
}

/// 状态转换结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(RegistrationStatus),
    /// 已处于目标状态，无需请求
    Unchanged,
}

impl RegistrationStatus {
    /// 按动作计算下一个状态；不合法的转换返回 `ValidationFailure`
    pub fn transition(self, action: &RegistrationAction) -> Result<Transition> {
        use RegistrationStatus::*;

        match (action, self) {
            (RegistrationAction::Register, None | Cancelled) => Ok(Transition::To(Pending)),
            (RegistrationAction::Register, Pending | Approved) => {
                Err(AppError::validation("您已报名该活动"))
            }
            (RegistrationAction::Register, Rejected) => {
                Err(AppError::validation("您的报名已被拒绝，无法再次报名"))
            }
            (RegistrationAction::Register, Completed) => {
                Err(AppError::validation("该活动已完成"))
            }

            (RegistrationAction::Cancel, None) => Ok(Transition::Unchanged),
            (RegistrationAction::Cancel, _) => Ok(Transition::To(None)),

            (RegistrationAction::Approve { .. }, Pending) => Ok(Transition::To(Approved)),
            (RegistrationAction::Reject { .. }, Pending) => Ok(Transition::To(Rejected)),
            (RegistrationAction::Complete { .. }, Approved) => Ok(Transition::To(Completed)),
            (action, current) => Err(AppError::ValidationFailure(format!(
                "当前状态 {} 不能执行 {}",
                current,
                action.name()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(with = "flexible_id", alias = "_id")]
    pub id: String,
    #[serde(with = "flexible_id", alias = "event_id")]
    pub event_id: String,
    #[serde(default, alias = "volunteer")]
    pub user: Option<UserSummary>,
    pub status: RegistrationStatus,
    #[serde(default, alias = "rejectionReason", alias = "rejection_reason")]
    pub reason: Option<String>,
    #[serde(default, alias = "registered_at", alias = "createdAt", alias = "created_at")]
    pub registered_at: Option<DateTime<Utc>>,
}

/// 拒绝报名请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RejectRegistrationRequest {
    #[validate(length(min = 5, max = 500))]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_viewer_transitions() {
        use RegistrationStatus::*;

        assert_eq!(None.transition(&RegistrationAction::Register).unwrap(), Transition::To(Pending));
        assert_eq!(Cancelled.transition(&RegistrationAction::Register).unwrap(), Transition::To(Pending));
        assert!(Pending.transition(&RegistrationAction::Register).is_err());

        for status in [Pending, Approved, Rejected, Cancelled, Completed] {
            assert_eq!(status.transition(&RegistrationAction::Cancel).unwrap(), Transition::To(None));
        }
        assert_eq!(None.transition(&RegistrationAction::Cancel).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn test_manager_transitions() {
        use RegistrationStatus::*;
        let approve = RegistrationAction::Approve { registration_id: "r1".into() };
        let complete = RegistrationAction::Complete { registration_id: "r1".into() };
        let reject = RegistrationAction::Reject {
            registration_id: "r1".into(),
            reason: "活动人数已满".into(),
        };

        assert_eq!(Pending.transition(&approve).unwrap(), Transition::To(Approved));
        assert_eq!(Pending.transition(&reject).unwrap(), Transition::To(Rejected));
        assert_eq!(Approved.transition(&complete).unwrap(), Transition::To(Completed));

        assert!(Approved.transition(&approve).is_err());
        assert!(Pending.transition(&complete).is_err());
        assert!(Completed.transition(&reject).is_err());
        assert!(approve.is_manager_action());
        assert!(!RegistrationAction::Cancel.is_manager_action());
    }

    #[test]
    fn test_deserialize_registration() {
        let reg: Registration = serde_json::from_value(json!({
            "id": 5,
            "eventId": 9,
            "status": "pending",
            "user": { "id": "u1", "name": "Ana" },
            "createdAt": "2024-06-01T08:00:00Z"
        }))
        .unwrap();

        assert_eq!(reg.id, "5");
        assert_eq!(reg.event_id, "9");
        assert_eq!(reg.status, RegistrationStatus::Pending);
        assert_eq!(reg.user.unwrap().name, "Ana");
        assert!(reg.registered_at.is_some());
    }
}
