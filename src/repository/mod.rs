// ==========================================
// 司机排班调度系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod assignment_repo;
pub mod driver_repo;
pub mod error;
pub mod schedule_run_lock_repo;
pub mod subject_repo;

// 重导出核心仓储
pub use assignment_repo::AssignmentRepository;
pub use driver_repo::DriverRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use schedule_run_lock_repo::{ScheduleRunLockRepository, STALE_LOCK_MINUTES};
pub use subject_repo::SubjectRepository;
