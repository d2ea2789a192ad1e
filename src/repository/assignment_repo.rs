// ==========================================
// 司机排班调度系统 - 分配仓储
// ==========================================
// 职责: assignment 表读写 + 并发控制
// 并发:
// - 新建: 事务内"检查班次是否已占用 → 写入",部分唯一索引兜底
// - 更新: 乐观锁 (WHERE revision = ?)
// - 级联: apply_batch 在一个 IMMEDIATE 事务内校验 scope 并写入全部变更
// 红线: Repository 不含业务逻辑; violation 状态不得以 active 写入
// ==========================================

use crate::domain::assignment::{
    Assignment, AssignmentWithSubject, AssignmentWrite, ValidationSummary,
};
use crate::domain::cascade::CascadeScope;
use crate::domain::types::ValidationStatus;
use crate::repository::driver_repo::placeholders;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::subject_repo::{
    format_date, format_datetime, parse_datetime, SubjectRow, SUBJECT_COLUMNS,
};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const ASSIGNMENT_COLUMNS: &str = "a.assignment_id, a.tenant_id, a.driver_id, a.subject_id, a.assigned_at, a.is_active, a.validation_status, a.validation_summary, a.revision";
const ASSIGNMENT_COLUMN_COUNT: usize = 9;

/// assignment 表原始行
struct AssignmentRow {
    assignment_id: String,
    tenant_id: String,
    driver_id: String,
    subject_id: String,
    assigned_at: String,
    is_active: bool,
    validation_status: String,
    validation_summary: String,
    revision: i32,
}

impl AssignmentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            assignment_id: row.get(0)?,
            tenant_id: row.get(1)?,
            driver_id: row.get(2)?,
            subject_id: row.get(3)?,
            assigned_at: row.get(4)?,
            is_active: row.get::<_, i64>(5)? != 0,
            validation_status: row.get(6)?,
            validation_summary: row.get(7)?,
            revision: row.get(8)?,
        })
    }

    fn into_assignment(self) -> RepositoryResult<Assignment> {
        let validation_summary: ValidationSummary = if self.validation_summary.trim().is_empty() {
            ValidationSummary::default()
        } else {
            serde_json::from_str(&self.validation_summary)?
        };

        Ok(Assignment {
            assigned_at: parse_datetime("assigned_at", &self.assigned_at)?,
            assignment_id: self.assignment_id,
            tenant_id: self.tenant_id,
            driver_id: self.driver_id,
            subject_id: self.subject_id,
            is_active: self.is_active,
            validation_status: ValidationStatus::from_str(&self.validation_status),
            validation_summary,
            revision: self.revision,
        })
    }
}

type JoinedRow = (AssignmentRow, SubjectRow);

fn read_joined(row: &Row<'_>) -> rusqlite::Result<JoinedRow> {
    Ok((
        AssignmentRow::read(row)?,
        SubjectRow::read(row, ASSIGNMENT_COLUMN_COUNT)?,
    ))
}

fn into_joined(rows: Vec<JoinedRow>) -> RepositoryResult<Vec<AssignmentWithSubject>> {
    rows.into_iter()
        .map(|(a, s)| {
            Ok(AssignmentWithSubject {
                assignment: a.into_assignment()?,
                subject: s.into_subject()?,
            })
        })
        .collect()
}

fn joined_select(filter: &str) -> String {
    format!(
        r#"
        SELECT {}, {}
        FROM assignment a
        JOIN assignment_subject s ON s.subject_id = a.subject_id
        WHERE {}
        ORDER BY s.start_at, a.assignment_id
        "#,
        ASSIGNMENT_COLUMNS, SUBJECT_COLUMNS, filter
    )
}

/// 按 scope 读取有效分配的 (assignment_id → revision)
fn scope_revisions(conn: &Connection, scope: &CascadeScope) -> RepositoryResult<HashMap<String, i32>> {
    if scope.driver_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        r#"
        SELECT a.assignment_id, a.revision
        FROM assignment a
        JOIN assignment_subject s ON s.subject_id = a.subject_id
        WHERE a.is_active = 1
          AND s.service_date BETWEEN ?1 AND ?2
          AND a.driver_id IN ({})
        "#,
        placeholders(3, scope.driver_ids.len())
    );
    let mut values: Vec<Value> = vec![
        Value::Text(format_date(scope.from_date)),
        Value::Text(format_date(scope.to_date)),
    ];
    values.extend(scope.driver_ids.iter().map(|id| Value::Text(id.clone())));

    let mut stmt = conn.prepare(&sql)?;
    let revisions = stmt
        .query_map(params_from_iter(values), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(revisions)
}

/// 0 行受影响时区分"不存在"与"版本冲突"
fn revision_miss(conn: &Connection, assignment_id: &str, expected: i32) -> RepositoryError {
    let exists = conn
        .query_row(
            "SELECT 1 FROM assignment WHERE assignment_id = ?1",
            params![assignment_id],
            |_| Ok(()),
        )
        .optional();
    match exists {
        Ok(Some(())) => RepositoryError::OptimisticLockFailure {
            assignment_id: assignment_id.to_string(),
            expected,
        },
        Ok(None) => RepositoryError::not_found("Assignment", assignment_id),
        Err(e) => e.into(),
    }
}

fn ensure_not_blocking(status: ValidationStatus) -> RepositoryResult<()> {
    if status.is_blocking() {
        return Err(RepositoryError::field(
            "validation_status",
            "violation assignments cannot be stored as active",
        ));
    }
    Ok(())
}

/// 单条指令(已在事务内)
fn apply_write(conn: &Connection, write: &AssignmentWrite) -> RepositoryResult<()> {
    let (assignment_id, expected, rows) = match write {
        AssignmentWrite::Move {
            assignment_id,
            expected_revision,
            driver_id,
            validation_status,
            validation_summary,
        } => {
            ensure_not_blocking(*validation_status)?;
            let rows = conn.execute(
                r#"
                UPDATE assignment
                SET driver_id = ?1, validation_status = ?2, validation_summary = ?3,
                    revision = revision + 1, updated_at = datetime('now', 'localtime')
                WHERE assignment_id = ?4 AND revision = ?5 AND is_active = 1
                "#,
                params![
                    driver_id,
                    validation_status.to_db_str(),
                    serde_json::to_string(validation_summary)?,
                    assignment_id,
                    expected_revision,
                ],
            )?;
            (assignment_id, *expected_revision, rows)
        }
        AssignmentWrite::Revalidate {
            assignment_id,
            expected_revision,
            validation_status,
            validation_summary,
        } => {
            ensure_not_blocking(*validation_status)?;
            let rows = conn.execute(
                r#"
                UPDATE assignment
                SET validation_status = ?1, validation_summary = ?2,
                    revision = revision + 1, updated_at = datetime('now', 'localtime')
                WHERE assignment_id = ?3 AND revision = ?4 AND is_active = 1
                "#,
                params![
                    validation_status.to_db_str(),
                    serde_json::to_string(validation_summary)?,
                    assignment_id,
                    expected_revision,
                ],
            )?;
            (assignment_id, *expected_revision, rows)
        }
        AssignmentWrite::Deactivate {
            assignment_id,
            expected_revision,
        } => {
            let rows = conn.execute(
                r#"
                UPDATE assignment
                SET is_active = 0, revision = revision + 1,
                    updated_at = datetime('now', 'localtime')
                WHERE assignment_id = ?1 AND revision = ?2 AND is_active = 1
                "#,
                params![assignment_id, expected_revision],
            )?;
            (assignment_id, *expected_revision, rows)
        }
    };

    if rows == 0 {
        return Err(revision_miss(conn, assignment_id, expected));
    }
    Ok(())
}

// ==========================================
// AssignmentRepository - 分配仓储
// ==========================================
pub struct AssignmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssignmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 新建有效分配(原子"检查 → 写入")
    ///
    /// # 返回
    /// - Err(SubjectAlreadyAssigned): 班次已有其他有效分配
    pub fn insert_active(&self, assignment: &Assignment) -> RepositoryResult<()> {
        ensure_not_blocking(assignment.validation_status)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let holder: Option<String> = tx
            .query_row(
                "SELECT assignment_id FROM assignment WHERE subject_id = ?1 AND is_active = 1",
                params![assignment.subject_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(assignment_id) = holder {
            return Err(RepositoryError::SubjectAlreadyAssigned {
                subject_id: assignment.subject_id.clone(),
                assignment_id,
            });
        }

        let inserted = tx.execute(
            r#"
            INSERT INTO assignment (
              assignment_id, tenant_id, driver_id, subject_id, assigned_at,
              is_active, validation_status, validation_summary, revision
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8)
            "#,
            params![
                assignment.assignment_id,
                assignment.tenant_id,
                assignment.driver_id,
                assignment.subject_id,
                format_datetime(assignment.assigned_at),
                assignment.validation_status.to_db_str(),
                serde_json::to_string(&assignment.validation_summary)?,
                assignment.revision,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) => {
                return Err(match RepositoryError::from(e) {
                    RepositoryError::UniqueConstraintViolation(msg)
                        if msg.contains("assignment.subject_id") =>
                    {
                        RepositoryError::SubjectAlreadyAssigned {
                            subject_id: assignment.subject_id.clone(),
                            assignment_id: String::new(),
                        }
                    }
                    other => other,
                });
            }
        }

        tx.commit()?;
        debug!(
            assignment_id = %assignment.assignment_id,
            subject_id = %assignment.subject_id,
            driver_id = %assignment.driver_id,
            "分配已写入"
        );
        Ok(())
    }

    /// 改派/重校验单条分配(乐观锁)
    ///
    /// 返回写入后的分配
    pub fn update_checked(&self, write: &AssignmentWrite) -> RepositoryResult<Assignment> {
        {
            let conn = self.get_conn()?;
            apply_write(&conn, write)?;
        }
        self.find_by_id(write.assignment_id())?
            .ok_or_else(|| RepositoryError::not_found("Assignment", write.assignment_id()))
    }

    /// 改派司机(班次不变,无需占用检查)
    pub fn reassign(
        &self,
        assignment_id: &str,
        expected_revision: i32,
        driver_id: &str,
        validation_status: ValidationStatus,
        validation_summary: ValidationSummary,
    ) -> RepositoryResult<Assignment> {
        self.update_checked(&AssignmentWrite::Move {
            assignment_id: assignment_id.to_string(),
            expected_revision,
            driver_id: driver_id.to_string(),
            validation_status,
            validation_summary,
        })
    }

    pub fn revalidate(
        &self,
        assignment_id: &str,
        expected_revision: i32,
        validation_status: ValidationStatus,
        validation_summary: ValidationSummary,
    ) -> RepositoryResult<Assignment> {
        self.update_checked(&AssignmentWrite::Revalidate {
            assignment_id: assignment_id.to_string(),
            expected_revision,
            validation_status,
            validation_summary,
        })
    }

    /// 取消分配,释放班次
    pub fn deactivate(&self, assignment_id: &str, expected_revision: i32) -> RepositoryResult<Assignment> {
        self.update_checked(&AssignmentWrite::Deactivate {
            assignment_id: assignment_id.to_string(),
            expected_revision,
        })
    }

    /// 批量写入(级联执行)
    ///
    /// # 流程(同一 IMMEDIATE 事务)
    /// 1. 重新读取 scope 内有效分配的 revision,与分析时读取的结果比较
    /// 2. 逐条按 revision 写入
    /// 3. 任一步失败 → 整体回滚
    pub fn apply_batch(
        &self,
        scope: &CascadeScope,
        expected_revisions: &HashMap<String, i32>,
        writes: &[AssignmentWrite],
    ) -> RepositoryResult<Vec<String>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = scope_revisions(&tx, scope)?;
        if &current != expected_revisions {
            let drifted = current
                .iter()
                .find(|(id, rev)| expected_revisions.get(*id) != Some(rev))
                .map(|(id, _)| id.clone())
                .or_else(|| {
                    expected_revisions
                        .keys()
                        .find(|id| !current.contains_key(*id))
                        .cloned()
                })
                .unwrap_or_default();
            warn!(assignment_id = %drifted, "级联范围内的分配已变化,拒绝写入");
            return Err(RepositoryError::OptimisticLockFailure {
                expected: expected_revisions.get(&drifted).copied().unwrap_or_default(),
                assignment_id: drifted,
            });
        }

        for write in writes {
            apply_write(&tx, write)?;
        }
        tx.commit()?;

        Ok(writes.iter().map(|w| w.assignment_id().to_string()).collect())
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_by_id(&self, assignment_id: &str) -> RepositoryResult<Option<Assignment>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM assignment a WHERE a.assignment_id = ?1",
                    ASSIGNMENT_COLUMNS
                ),
                params![assignment_id],
                AssignmentRow::read,
            )
            .optional()?;
        row.map(AssignmentRow::into_assignment).transpose()
    }

    pub fn find_with_subject_by_id(
        &self,
        assignment_id: &str,
    ) -> RepositoryResult<Option<AssignmentWithSubject>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &joined_select("a.assignment_id = ?1"),
                params![assignment_id],
                read_joined,
            )
            .optional()?;
        Ok(into_joined(row.into_iter().collect())?.pop())
    }

    pub fn find_active_by_subject(&self, subject_id: &str) -> RepositoryResult<Option<Assignment>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM assignment a WHERE a.subject_id = ?1 AND a.is_active = 1",
                    ASSIGNMENT_COLUMNS
                ),
                params![subject_id],
                AssignmentRow::read,
            )
            .optional()?;
        row.map(AssignmentRow::into_assignment).transpose()
    }

    /// 租户全部有效分配
    pub fn find_active_by_tenant(&self, tenant_id: &str) -> RepositoryResult<Vec<AssignmentWithSubject>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&joined_select("a.tenant_id = ?1 AND a.is_active = 1"))?;
        let rows = stmt
            .query_map(params![tenant_id], read_joined)?
            .collect::<Result<Vec<_>, _>>()?;
        into_joined(rows)
    }

    /// 租户在服务日期范围 [from, to] 内的有效分配
    pub fn find_active_by_tenant_and_date_range(
        &self,
        tenant_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<AssignmentWithSubject>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&joined_select(
            "a.tenant_id = ?1 AND a.is_active = 1 AND s.service_date BETWEEN ?2 AND ?3",
        ))?;
        let rows = stmt
            .query_map(
                params![tenant_id, format_date(from), format_date(to)],
                read_joined,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        into_joined(rows)
    }

    /// 司机在服务日期范围 [from, to] 内的有效分配(回溯查询)
    pub fn find_active_by_driver_and_date_range(
        &self,
        driver_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<AssignmentWithSubject>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&joined_select(
            "a.driver_id = ?1 AND a.is_active = 1 AND s.service_date BETWEEN ?2 AND ?3",
        ))?;
        let rows = stmt
            .query_map(
                params![driver_id, format_date(from), format_date(to)],
                read_joined,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        into_joined(rows)
    }

    /// 级联 scope 内的有效分配(与 apply_batch 的校验读取同一范围)
    pub fn find_active_in_scope(&self, scope: &CascadeScope) -> RepositoryResult<Vec<AssignmentWithSubject>> {
        if scope.driver_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let filter = format!(
            "a.is_active = 1 AND s.service_date BETWEEN ?1 AND ?2 AND a.driver_id IN ({})",
            placeholders(3, scope.driver_ids.len())
        );
        let mut values: Vec<Value> = vec![
            Value::Text(format_date(scope.from_date)),
            Value::Text(format_date(scope.to_date)),
        ];
        values.extend(scope.driver_ids.iter().map(|id| Value::Text(id.clone())));

        let mut stmt = conn.prepare(&joined_select(&filter))?;
        let rows = stmt
            .query_map(params_from_iter(values), read_joined)?
            .collect::<Result<Vec<_>, _>>()?;
        into_joined(rows)
    }

    /// 目标日期之前的有效分配(学习得分的历史样本)
    pub fn find_history_before(
        &self,
        tenant_id: &str,
        before: NaiveDate,
    ) -> RepositoryResult<Vec<AssignmentWithSubject>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&joined_select(
            "a.tenant_id = ?1 AND a.is_active = 1 AND s.service_date < ?2",
        ))?;
        let rows = stmt
            .query_map(params![tenant_id, format_date(before)], read_joined)?
            .collect::<Result<Vec<_>, _>>()?;
        into_joined(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};
    use crate::domain::driver::Driver;
    use crate::domain::subject::AssignmentSubject;
    use crate::domain::types::{DriverStatus, SoloType};
    use crate::repository::driver_repo::DriverRepository;
    use crate::repository::subject_repo::SubjectRepository;
    use chrono::NaiveDateTime;

    fn ts(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup() -> AssignmentRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let drivers = DriverRepository::new(conn.clone());
        for id in ["d1", "d2"] {
            drivers
                .upsert(&Driver {
                    driver_id: id.to_string(),
                    tenant_id: "t1".to_string(),
                    name: id.to_uppercase(),
                    solo_types: vec![SoloType::Solo1],
                    status: DriverStatus::Active,
                    is_protected: false,
                })
                .unwrap();
        }
        let subjects = SubjectRepository::new(conn.clone());
        for (id, day) in [("b1", "2025-03-03"), ("b2", "2025-03-04")] {
            subjects
                .upsert(&AssignmentSubject {
                    subject_id: id.to_string(),
                    tenant_id: "t1".to_string(),
                    service_date: NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
                    start_at: ts(&format!("{} 08:00", day)),
                    end_at: ts(&format!("{} 18:00", day)),
                    duration_hours: 10.0,
                    solo_type: SoloType::Solo1,
                    resource_id: Some("TR-1".to_string()),
                    contract_id: None,
                })
                .unwrap();
        }
        AssignmentRepository::new(conn)
    }

    fn new_assignment(driver_id: &str, subject_id: &str) -> Assignment {
        Assignment::new_active(
            "t1",
            driver_id,
            subject_id,
            ts("2025-03-01 09:00"),
            ValidationStatus::Valid,
            ValidationSummary::default(),
        )
    }

    #[test]
    fn test_second_active_assignment_for_subject_is_rejected() {
        let repo = setup();
        let first = new_assignment("d1", "b1");
        repo.insert_active(&first).unwrap();

        match repo.insert_active(&new_assignment("d2", "b1")) {
            Err(RepositoryError::SubjectAlreadyAssigned { assignment_id, .. }) => {
                assert_eq!(assignment_id, first.assignment_id)
            }
            other => panic!("expected SubjectAlreadyAssigned, got {:?}", other),
        }

        // 取消后可重新分配
        repo.update_checked(&AssignmentWrite::Deactivate {
            assignment_id: first.assignment_id.clone(),
            expected_revision: 1,
        })
        .unwrap();
        repo.insert_active(&new_assignment("d2", "b1")).unwrap();
        assert_eq!(repo.find_active_by_subject("b1").unwrap().unwrap().driver_id, "d2");
    }

    #[test]
    fn test_violation_is_never_stored_as_active() {
        let repo = setup();
        let mut a = new_assignment("d1", "b1");
        a.validation_status = ValidationStatus::Violation;
        assert!(matches!(
            repo.insert_active(&a),
            Err(RepositoryError::FieldValueError { .. })
        ));
        assert!(repo.find_active_by_subject("b1").unwrap().is_none());
    }

    #[test]
    fn test_stale_revision_is_rejected() {
        let repo = setup();
        let a = new_assignment("d1", "b1");
        repo.insert_active(&a).unwrap();

        let moved = repo
            .update_checked(&AssignmentWrite::Move {
                assignment_id: a.assignment_id.clone(),
                expected_revision: 1,
                driver_id: "d2".to_string(),
                validation_status: ValidationStatus::Warning,
                validation_summary: ValidationSummary {
                    messages: vec!["HOS_WARNING".to_string()],
                    ..Default::default()
                },
            })
            .unwrap();
        assert_eq!(moved.revision, 2);
        assert_eq!(moved.driver_id, "d2");
        assert_eq!(moved.validation_summary.messages, vec!["HOS_WARNING".to_string()]);

        let stale = repo.update_checked(&AssignmentWrite::Revalidate {
            assignment_id: a.assignment_id.clone(),
            expected_revision: 1,
            validation_status: ValidationStatus::Valid,
            validation_summary: ValidationSummary::default(),
        });
        assert!(matches!(stale, Err(RepositoryError::OptimisticLockFailure { expected: 1, .. })));

        let missing = repo.update_checked(&AssignmentWrite::Deactivate {
            assignment_id: "nope".to_string(),
            expected_revision: 1,
        });
        assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
    }

    #[test]
    fn test_apply_batch_checks_scope_and_rolls_back() {
        let repo = setup();
        let a1 = new_assignment("d1", "b1");
        let a2 = new_assignment("d1", "b2");
        repo.insert_active(&a1).unwrap();
        repo.insert_active(&a2).unwrap();

        let scope = CascadeScope {
            driver_ids: vec!["d1".to_string(), "d2".to_string()],
            from_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
        };
        let in_scope = repo.find_active_in_scope(&scope).unwrap();
        assert_eq!(in_scope.len(), 2);
        let observed: HashMap<String, i32> = in_scope
            .iter()
            .map(|a| (a.assignment_id().to_string(), a.assignment.revision))
            .collect();

        // 第二条指令版本过期 → 整批回滚
        let bad = vec![
            AssignmentWrite::Deactivate {
                assignment_id: a1.assignment_id.clone(),
                expected_revision: 1,
            },
            AssignmentWrite::Deactivate {
                assignment_id: a2.assignment_id.clone(),
                expected_revision: 7,
            },
        ];
        assert!(repo.apply_batch(&scope, &observed, &bad).is_err());
        assert!(repo.find_by_id(&a1.assignment_id).unwrap().unwrap().is_active);

        // 范围内有变化 → 拒绝
        let mut drifted = observed.clone();
        drifted.insert(a1.assignment_id.clone(), 5);
        assert!(matches!(
            repo.apply_batch(&scope, &drifted, &[]),
            Err(RepositoryError::OptimisticLockFailure { .. })
        ));

        let ok = vec![AssignmentWrite::Move {
            assignment_id: a1.assignment_id.clone(),
            expected_revision: 1,
            driver_id: "d2".to_string(),
            validation_status: ValidationStatus::Valid,
            validation_summary: ValidationSummary::default(),
        }];
        let updated = repo.apply_batch(&scope, &observed, &ok).unwrap();
        assert_eq!(updated, vec![a1.assignment_id.clone()]);

        let d2 = repo
            .find_active_by_driver_and_date_range(
                "d2",
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
            )
            .unwrap();
        assert_eq!(d2.len(), 1);
        assert_eq!(d2[0].subject.subject_id, "b1");
    }

    #[test]
    fn test_history_excludes_target_week() {
        let repo = setup();
        repo.insert_active(&new_assignment("d1", "b1")).unwrap();
        repo.insert_active(&new_assignment("d1", "b2")).unwrap();

        let history = repo
            .find_history_before("t1", NaiveDate::from_ymd_opt(2025, 3, 4).unwrap())
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].subject_id(), "b1");
        assert_eq!(repo.find_active_by_tenant("t1").unwrap().len(), 2);
    }
}
