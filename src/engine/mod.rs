// ==========================================
// 学生财务台账与成绩引擎 - 引擎层
// ==========================================
// 职责: 实现业务规则, 不拼 SQL
// 红线: 引擎不读取全局状态, 学年学期/当前时间均由调用方显式传入
// ==========================================

pub mod attendance_lock;
pub mod balance;
pub mod error;
pub mod fee_resolver;
pub mod grade_scale;
pub mod ledger;
pub mod publication;
pub mod ranking;
pub mod score_entry;
pub mod write_scheduler;

// 重导出核心引擎
pub use attendance_lock::{AttendanceRegisterLock, RegisterLockState, RegisterWrite};
pub use balance::{BalanceBreakdown, BalanceCalculator, DebtorReport};
pub use error::{EngineError, EngineResult};
pub use fee_resolver::{FeeResolver, ResolvedFees};
pub use grade_scale::{GradeResolution, GradeScaleResolver};
pub use ledger::{DiscountDraft, FeeDraft, LedgerValidator, LineItemDraft, PaymentDraft};
pub use publication::{PublicationState, PublicationStateMachine};
pub use ranking::{ClassRankCalculator, ClassRanking, SubjectStatistics};
pub use score_entry::{summarize_attendance, ScoreCaps, ScoreEntryEngine};
pub use write_scheduler::{FailedWrite, ScoreStore, ScoreWriteScheduler, StoreError};
