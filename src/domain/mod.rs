// ==========================================
// 司机排班调度系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod assignment;
pub mod cascade;
pub mod driver;
pub mod schedule;
pub mod subject;
pub mod types;
pub mod workload;

// 重导出核心类型
pub use assignment::{
    Assignment, AssignmentWithSubject, AssignmentWrite, ValidationMetrics, ValidationSummary,
};
pub use cascade::{
    AffectedAssignment, CascadeAction, CascadeAnalysis, CascadeFeasibility, CascadeRequest,
    CascadeResult, CascadeScope,
};
pub use driver::{Driver, ProtectedRule};
pub use schedule::{AutoBuildParams, AutoBuildSuggestion, DecisionAction, SchedulingResult};
pub use subject::{AssignmentSubject, NormalizeError, RawSubjectRecord};
pub use types::{DriverStatus, SoloType, TypeParseError, ValidationStatus, WorkloadLevel};
pub use workload::WorkloadSummary;
