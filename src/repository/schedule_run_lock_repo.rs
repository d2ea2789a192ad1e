// ==========================================
// 司机排班调度系统 - 排班运行锁仓储
// ==========================================
// 职责: 同一 (tenant, week) 同时只允许一个自动排班运行
// 说明: 超过 STALE_LOCK_MINUTES 未释放的锁可被接管
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::subject_repo::format_date;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// 锁过期时间(分钟)
pub const STALE_LOCK_MINUTES: i64 = 30;

pub struct ScheduleRunLockRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleRunLockRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 获取运行锁
    ///
    /// # 返回
    /// - Ok(()): 获取成功(新建、同一 run 重入、或接管过期锁)
    /// - Err(RunLockHeld): 其他 run 持有未过期的锁
    pub fn try_acquire(&self, tenant_id: &str, week_start: NaiveDate, run_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let week = format_date(week_start);
        let stale = format!("-{} minutes", STALE_LOCK_MINUTES);

        let rows = conn.execute(
            r#"
            INSERT INTO schedule_run_lock (tenant_id, week_start, run_id, locked_at)
            VALUES (?1, ?2, ?3, datetime('now', 'localtime'))
            ON CONFLICT(tenant_id, week_start) DO UPDATE SET
              run_id = excluded.run_id,
              locked_at = excluded.locked_at
            WHERE schedule_run_lock.run_id = excluded.run_id
               OR schedule_run_lock.locked_at < datetime('now', 'localtime', ?4)
            "#,
            params![tenant_id, week, run_id, stale],
        )?;

        if rows > 0 {
            info!(tenant_id, week_start = %week, run_id, "排班运行锁已获取");
            return Ok(());
        }

        let holder: Option<String> = conn
            .query_row(
                "SELECT run_id FROM schedule_run_lock WHERE tenant_id = ?1 AND week_start = ?2",
                params![tenant_id, week],
                |row| row.get(0),
            )
            .optional()?;
        warn!(tenant_id, week_start = %week, holder = ?holder, "排班运行锁被占用");
        Err(RepositoryError::RunLockHeld {
            tenant_id: tenant_id.to_string(),
            week_start: week,
            run_id: holder.unwrap_or_default(),
        })
    }

    /// 释放运行锁(仅持有者可释放)
    pub fn release(&self, tenant_id: &str, week_start: NaiveDate, run_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM schedule_run_lock WHERE tenant_id = ?1 AND week_start = ?2 AND run_id = ?3",
            params![tenant_id, format_date(week_start), run_id],
        )?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};

    fn repo() -> (ScheduleRunLockRepository, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        (ScheduleRunLockRepository::new(conn.clone()), conn)
    }

    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
    }

    #[test]
    fn test_second_run_is_rejected_until_release() {
        let (repo, _) = repo();
        repo.try_acquire("t1", week(), "run-a").unwrap();
        repo.try_acquire("t1", week(), "run-a").unwrap();

        match repo.try_acquire("t1", week(), "run-b") {
            Err(RepositoryError::RunLockHeld { run_id, .. }) => assert_eq!(run_id, "run-a"),
            other => panic!("expected RunLockHeld, got {:?}", other),
        }

        // 其他租户/周不受影响
        repo.try_acquire("t2", week(), "run-b").unwrap();
        repo.try_acquire("t1", week() + chrono::Duration::days(7), "run-b").unwrap();

        assert_eq!(repo.release("t1", week(), "run-b").unwrap(), 0);
        assert_eq!(repo.release("t1", week(), "run-a").unwrap(), 1);
        repo.try_acquire("t1", week(), "run-b").unwrap();
    }

    #[test]
    fn test_stale_lock_can_be_taken_over() {
        let (repo, conn) = repo();
        repo.try_acquire("t1", week(), "run-a").unwrap();
        conn.lock()
            .unwrap()
            .execute(
                "UPDATE schedule_run_lock SET locked_at = datetime('now', 'localtime', '-31 minutes')",
                [],
            )
            .unwrap();

        repo.try_acquire("t1", week(), "run-b").unwrap();
        assert_eq!(repo.release("t1", week(), "run-a").unwrap(), 0);
    }
}
