// ==========================================
// 学生财务台账与成绩引擎 - API 层
// ==========================================
// 职责: 组合 Repository + Engine + Config, 对外提供业务接口
// ==========================================

pub mod attendance_api;
pub mod config_api;
pub mod error;
pub mod ledger_api;
pub mod score_api;

// 重导出核心类型
pub use attendance_api::AttendanceApi;
pub use config_api::ConfigApi;
pub use error::{ApiError, ApiResult};
pub use ledger_api::{LedgerApi, OnlinePaymentRequest};
pub use score_api::ScoreApi;
