// ==========================================
// 学生财务台账与成绩引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 校验失败在持久化之前返回, 不产生部分写入
// ==========================================

use chrono::NaiveDate;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("字段值错误 (field={field}): {message}")]
    Validation { field: String, message: String },

    #[error("考勤表已存在: class_id={class_id}, date={date}")]
    DuplicateRegister { class_id: String, date: NaiveDate },

    #[error("考勤表已锁定: register_id={register_id}, {reason}")]
    RegisterLocked { register_id: String, reason: String },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },
}

impl EngineError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
