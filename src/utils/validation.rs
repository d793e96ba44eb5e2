use crate::{
    error::{AppError, Result},
    models::registration::RejectRegistrationRequest,
};
use validator::Validate;

/// 拒绝报名时理由的最少字符数（去除首尾空白后）
pub const MIN_REJECT_REASON_CHARS: usize = 5;
pub const MAX_REJECT_REASON_CHARS: usize = 500;

/// 验证实体 ID：不能为空，不能包含路径分隔符
pub fn validate_entity_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(AppError::ValidationFailure(format!("{} ID 不能为空", kind)));
    }

    if id.contains('/') || id.contains('?') || id.contains('#') {
        return Err(AppError::ValidationFailure(format!("{} ID 格式不正确", kind)));
    }

    Ok(())
}

/// 验证拒绝理由，返回去除首尾空白后的请求体
pub fn validate_reject_reason(reason: &str) -> Result<RejectRegistrationRequest> {
    let request = RejectRegistrationRequest {
        reason: reason.trim().to_string(),
    };

    request.validate().map_err(|_| {
        AppError::ValidationFailure(format!(
            "拒绝理由需要{}到{}个字符",
            MIN_REJECT_REASON_CHARS, MAX_REJECT_REASON_CHARS
        ))
    })?;

    Ok(request)
}
