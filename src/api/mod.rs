// ==========================================
// 司机排班调度系统 - API 层
// ==========================================
// 职责: 读取仓储 → 调用引擎 → 写入仓储,供 CLI 与外部调用方使用
// ==========================================

pub mod assignment_api;
pub mod cascade_api;
pub mod error;
pub mod schedule_api;

// 重导出核心类型
pub use assignment_api::{AssignmentApi, AssignmentWriteResult};
pub use cascade_api::CascadeApi;
pub use error::{ApiError, ApiResult};
pub use schedule_api::{BuildScheduleOptions, ScheduleApi};
