// ==========================================
// 学生财务台账与成绩引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、封闭枚举、值对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod attendance;
pub mod fee;
pub mod grading;
pub mod score;
pub mod types;

// 重导出核心类型
pub use attendance::{AttendanceRecord, AttendanceRegister, AttendanceSummary, NewAttendanceRegister};
pub use fee::{FeeStructure, Payment, PaymentLineItem, Student, StudentDiscount};
pub use grading::{GradeRange, GradingScheme, GradingSchemeError};
pub use score::{PublishedResult, ScoreAggregate, ScoreKey, ScoreRow, StudentResultView};
pub use types::{
    AcademicPeriod, AttendanceStatus, ClassScope, DiscountCategory, PaymentMethod,
    PaymentPurpose, RecordField, ScoreField, TraitDomain,
};
