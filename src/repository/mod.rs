// ==========================================
// 学生财务台账与成绩引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod attendance_repo;
pub mod error;
pub mod fee_repo;
pub mod payment_gateway;
pub mod payment_repo;
pub mod score_repo;
pub mod student_repo;

// 重导出核心仓储
pub use attendance_repo::AttendanceRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use fee_repo::FeeStructureRepository;
pub use payment_gateway::{PaymentVerifier, VerificationOutcome};
pub use payment_repo::PaymentRepository;
pub use score_repo::ScoreRepository;
pub use student_repo::StudentRepository;
