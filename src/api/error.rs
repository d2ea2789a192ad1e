// ==========================================
// 司机排班调度系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型,转换Repository/引擎输入错误为调用方可处理的错误
// 说明: 校验 warning/violation 是数据而不是错误;
//       只有 violation 阻断写入时才返回 AssignmentRejected
// ==========================================

use crate::domain::cascade::CascadeAnalysis;
use crate::engine::assignment_validator::ValidationOutcome;
use crate::engine::cascade::CascadeInputError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 班次已有其他有效分配
    #[error("班次已被占用: subject_id={subject_id}, assignment_id={assignment_id}")]
    SubjectConflict {
        subject_id: String,
        assignment_id: String,
    },

    /// 校验结果为 violation,拒绝写入(附完整校验输出)
    #[error("分配被拒绝: {}", .outcome.validation_result.messages.join("; "))]
    AssignmentRejected { outcome: Box<ValidationOutcome> },

    /// 级联变更会产生 violation,未做任何写入
    #[error("级联变更不可行: {} 条受影响分配", .analysis.affected.len())]
    InfeasibleCascade { analysis: Box<CascadeAnalysis> },

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    #[error("排班运行中: {0}")]
    ScheduleRunInProgress(String),

    // ==========================================
    // 数据访问/配置错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure {
                assignment_id,
                expected,
            } => ApiError::OptimisticLockFailure(format!(
                "分配{}已被其他操作修改(期望revision={})",
                assignment_id, expected
            )),
            RepositoryError::SubjectAlreadyAssigned {
                subject_id,
                assignment_id,
            } => ApiError::SubjectConflict {
                subject_id,
                assignment_id,
            },
            RepositoryError::RunLockHeld {
                tenant_id,
                week_start,
                run_id,
            } => ApiError::ScheduleRunInProgress(format!(
                "tenant={}, week_start={}, run_id={}",
                tenant_id, week_start, run_id
            )),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::InvalidInput(format!("外键约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
        }
    }
}

impl From<CascadeInputError> for ApiError {
    fn from(err: CascadeInputError) -> Self {
        match err {
            CascadeInputError::AssignmentNotFound(id) => {
                ApiError::NotFound(format!("Assignment(id={})不存在", id))
            }
            CascadeInputError::DriverNotFound(id) => {
                ApiError::NotFound(format!("Driver(id={})不存在", id))
            }
            CascadeInputError::InactiveAssignment(_) | CascadeInputError::InvalidRequest(_) => {
                ApiError::InvalidInput(err.to_string())
            }
        }
    }
}

/// 配置读取失败
pub(crate) fn config_error(err: Box<dyn std::error::Error + Send + Sync>) -> ApiError {
    ApiError::ConfigError(err.to_string())
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let api_err: ApiError = RepositoryError::not_found("Subject", "B001").into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Subject"));
                assert!(msg.contains("B001"));
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }

        let api_err: ApiError = RepositoryError::OptimisticLockFailure {
            assignment_id: "A001".to_string(),
            expected: 3,
        }
        .into();
        match api_err {
            ApiError::OptimisticLockFailure(msg) => {
                assert!(msg.contains("A001"));
                assert!(msg.contains("revision=3"));
            }
            other => panic!("Expected OptimisticLockFailure, got {:?}", other),
        }

        let api_err: ApiError = RepositoryError::SubjectAlreadyAssigned {
            subject_id: "B001".to_string(),
            assignment_id: "A001".to_string(),
        }
        .into();
        assert!(matches!(api_err, ApiError::SubjectConflict { .. }));

        let api_err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(matches!(api_err, ApiError::DatabaseError(msg) if msg.contains("poisoned")));

        let api_err: ApiError = RepositoryError::ForeignKeyViolation("FOREIGN KEY constraint failed".to_string()).into();
        assert!(matches!(api_err, ApiError::InvalidInput(_)));
    }

    #[test]
    fn test_config_read_failure_maps_to_config_error() {
        let err: Box<dyn std::error::Error + Send + Sync> = "bad value".into();
        assert!(matches!(config_error(err), ApiError::ConfigError(msg) if msg == "bad value"));
    }

    #[test]
    fn test_cascade_input_error_conversion() {
        let api_err: ApiError = CascadeInputError::DriverNotFound("D9".to_string()).into();
        assert!(matches!(api_err, ApiError::NotFound(msg) if msg.contains("D9")));

        let api_err: ApiError = CascadeInputError::InactiveAssignment("A1".to_string()).into();
        assert!(matches!(api_err, ApiError::InvalidInput(_)));
    }
}
