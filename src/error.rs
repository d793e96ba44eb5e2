use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// 服务端未提供错误信息时展示给用户的兜底文案
pub const FALLBACK_MESSAGE: &str = "操作失败，请稍后重试";

#[derive(Error, Debug)]
pub enum AppError {
    /// 请求没有到达服务端或没有返回
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// 服务端返回 success:false 或非 2xx 状态
    #[error("Server rejected: {0}")]
    ServerRejected(String),

    /// 客户端前置条件不满足，未发出任何网络请求
    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// 便利函数，用于创建常见错误
impl AppError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkFailure(msg.into())
    }

    /// 服务端拒绝；消息为空时使用兜底文案
    pub fn rejected(msg: Option<String>) -> Self {
        match msg {
            Some(m) if !m.trim().is_empty() => Self::ServerRejected(m),
            _ => Self::ServerRejected(FALLBACK_MESSAGE.to_string()),
        }
    }

    pub fn validation(msg: &str) -> Self {
        Self::ValidationFailure(msg.to_string())
    }

    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{} not found", resource))
    }

    pub fn internal(msg: &str) -> Self {
        Self::Internal(msg.to_string())
    }

    /// 这类错误会触发乐观更新回滚
    pub fn is_rollback_kind(&self) -> bool {
        matches!(self, AppError::NetworkFailure(_) | AppError::ServerRejected(_))
    }

    /// 展示给用户的文案
    pub fn user_message(&self) -> String {
        match self {
            AppError::NetworkFailure(_) => "网络连接失败，请检查网络后重试".to_string(),
            AppError::ServerRejected(msg) | AppError::ValidationFailure(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Serialization(_) | AppError::Config(_) | AppError::Internal(_) => {
                FALLBACK_MESSAGE.to_string()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::Internal(format!("Failed to decode response: {}", err))
        } else {
            AppError::NetworkFailure(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_uses_fallback_for_missing_message() {
        assert_eq!(AppError::rejected(None).user_message(), FALLBACK_MESSAGE);
        assert_eq!(AppError::rejected(Some("  ".into())).user_message(), FALLBACK_MESSAGE);
        assert_eq!(
            AppError::rejected(Some("活动名额已满".into())).user_message(),
            "活动名额已满"
        );
    }

    #[test]
    fn test_rollback_kinds() {
        assert!(AppError::network("timeout").is_rollback_kind());
        assert!(AppError::rejected(None).is_rollback_kind());
        assert!(!AppError::validation("too short").is_rollback_kind());
        assert!(!AppError::not_found("Post").is_rollback_kind());
    }
}
