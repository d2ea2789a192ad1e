// ==========================================
// 司机排班调度系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 司机与班次分配、工时合规、自动排班
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 合规与调度规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施(连接初始化/PRAGMA 统一/建表)
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 服务组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DriverStatus, SoloType, ValidationStatus, WorkloadLevel};

// 领域实体
pub use domain::{
    Assignment, AssignmentSubject, AssignmentWithSubject, CascadeAnalysis, CascadeRequest, Driver,
    ProtectedRule, SchedulingResult, WorkloadSummary,
};

// 引擎
pub use engine::{
    AssignmentValidator, AutoBuildScheduler, CascadeEffectAnalyzer, HosComplianceCalculator,
    ProtectedRuleValidator, SwapCandidateFinder, WorkloadCalculator,
};

// API
pub use api::{AssignmentApi, CascadeApi, ScheduleApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "司机排班调度系统";
