// ==========================================
// 学生财务台账与成绩引擎 - API层错误类型
// ==========================================
// 职责: 定义对外错误分类，转换 Repository / Engine 错误
// 分类: 校验失败 / 重复考勤表 / 考勤表锁定 / 未找到 / 存储传输失败 / 配置错误
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("考勤表已存在: class_id={class_id}, date={date}")]
    DuplicateRegister { class_id: String, date: NaiveDate },

    #[error("考勤表已锁定: register_id={register_id}, {reason}")]
    RegisterLocked { register_id: String, reason: String },

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 存储 / 配置错误
    // ==========================================
    /// 数据存储读写失败 (连接、锁、SQL、序列化、网关不可达)
    #[error("存储访问失败: {0}")]
    TransportError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),
}

impl ApiError {
    pub fn config(err: impl std::fmt::Display) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            // 金额与明细不一致等写入前校验
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            other => ApiError::TransportError(other.to_string()),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation { field, message } => {
                ApiError::ValidationError(format!("字段{}错误: {}", field, message))
            }
            EngineError::DuplicateRegister { class_id, date } => {
                ApiError::DuplicateRegister { class_id, date }
            }
            EngineError::RegisterLocked { register_id, reason } => {
                ApiError::RegisterLocked { register_id, reason }
            }
            EngineError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_map_to_public_taxonomy() {
        let not_found: ApiError = RepositoryError::not_found("Fee", "F1").into();
        assert!(matches!(not_found, ApiError::NotFound(msg) if msg.contains("F1")));

        let lock: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(matches!(lock, ApiError::TransportError(_)));

        let unique: ApiError = RepositoryError::UniqueConstraintViolation("x".to_string()).into();
        assert!(matches!(unique, ApiError::TransportError(_)));
    }

    #[test]
    fn test_engine_errors_keep_their_kind() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let dup: ApiError = EngineError::DuplicateRegister {
            class_id: "JSS1".to_string(),
            date,
        }
        .into();
        assert!(matches!(dup, ApiError::DuplicateRegister { .. }));

        let invalid: ApiError = EngineError::validation("rating", "超出范围").into();
        assert!(matches!(invalid, ApiError::ValidationError(_)));
    }
}
