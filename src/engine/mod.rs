// ==========================================
// 司机排班调度系统 - 引擎层
// ==========================================
// 职责: 实现合规与调度规则,不拼 SQL
// 红线: Engine 不拼 SQL, 所有规则结论必须附带原因
// ==========================================

pub mod assignment_validator;
pub mod auto_build;
pub mod cascade;
pub mod hos;
pub mod protected_rule;
pub mod scoring;
pub mod swap_finder;
pub mod workload;

// 重导出核心引擎
pub use assignment_validator::{AssignmentValidator, ValidationOutcome, ValidationResult};
pub use auto_build::{
    AutoBuildInput, AutoBuildRun, AutoBuildScheduler, CommitOutcome, ScoreWeights,
};
pub use cascade::{CascadeEffectAnalyzer, CascadeInputError, CascadeSnapshot};
pub use hos::{ComplianceLimits, ComplianceRules, HosComplianceCalculator, HosResult};
pub use protected_rule::{ProtectedRuleCheck, ProtectedRuleValidator};
pub use scoring::{
    HistoricalScoreProvider, ScoreProvider, SlotClass, SlotDistribution, StaticScoreProvider,
};
pub use swap_finder::{RankedCandidate, SwapCandidateFinder};
pub use workload::{week_start_for, WorkloadCalculator, WorkloadThresholds};
