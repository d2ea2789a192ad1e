// ==========================================
// 司机排班调度系统 - 班次仓储
// ==========================================
// 职责: assignment_subject 表读写
// 说明: 原始记录在写入前经过 RawSubjectRecord::normalize()
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::subject::{AssignmentSubject, RawSubjectRecord};
use crate::domain::types::SoloType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) const SUBJECT_COLUMNS: &str = "s.subject_id, s.tenant_id, s.service_date, s.start_at, s.end_at, s.duration_hours, s.solo_type, s.resource_id, s.contract_id";

/// assignment_subject 表原始行
pub(crate) struct SubjectRow {
    subject_id: String,
    tenant_id: String,
    service_date: String,
    start_at: String,
    end_at: String,
    duration_hours: f64,
    solo_type: String,
    resource_id: Option<String>,
    contract_id: Option<String>,
}

impl SubjectRow {
    /// 从查询行读取班次列(offset 为第一列的下标)
    pub(crate) fn read(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            subject_id: row.get(offset)?,
            tenant_id: row.get(offset + 1)?,
            service_date: row.get(offset + 2)?,
            start_at: row.get(offset + 3)?,
            end_at: row.get(offset + 4)?,
            duration_hours: row.get(offset + 5)?,
            solo_type: row.get(offset + 6)?,
            resource_id: row.get(offset + 7)?,
            contract_id: row.get(offset + 8)?,
        })
    }

    pub(crate) fn into_subject(self) -> RepositoryResult<AssignmentSubject> {
        Ok(AssignmentSubject {
            service_date: parse_date("service_date", &self.service_date)?,
            start_at: parse_datetime("start_at", &self.start_at)?,
            end_at: parse_datetime("end_at", &self.end_at)?,
            duration_hours: self.duration_hours,
            solo_type: SoloType::parse(&self.solo_type)
                .map_err(|e| RepositoryError::field("solo_type", e))?,
            subject_id: self.subject_id,
            tenant_id: self.tenant_id,
            resource_id: self.resource_id,
            contract_id: self.contract_id,
        })
    }
}

pub(crate) fn parse_date(field: &str, raw: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| RepositoryError::field(field, e))
}

pub(crate) fn parse_datetime(field: &str, raw: &str) -> RepositoryResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|e| RepositoryError::field(field, e))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

// ==========================================
// SubjectRepository - 班次仓储
// ==========================================
pub struct SubjectRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SubjectRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入或覆盖班次
    pub fn upsert(&self, subject: &AssignmentSubject) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO assignment_subject (
              subject_id, tenant_id, service_date, start_at, end_at,
              duration_hours, solo_type, resource_id, contract_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(subject_id) DO UPDATE SET
              tenant_id = excluded.tenant_id,
              service_date = excluded.service_date,
              start_at = excluded.start_at,
              end_at = excluded.end_at,
              duration_hours = excluded.duration_hours,
              solo_type = excluded.solo_type,
              resource_id = excluded.resource_id,
              contract_id = excluded.contract_id
            "#,
            params![
                subject.subject_id,
                subject.tenant_id,
                format_date(subject.service_date),
                format_datetime(subject.start_at),
                format_datetime(subject.end_at),
                subject.duration_hours,
                subject.solo_type.to_db_str(),
                subject.resource_id,
                subject.contract_id,
            ],
        )?;
        Ok(())
    }

    /// 规范化原始记录后写入
    pub fn upsert_raw(&self, raw: &RawSubjectRecord) -> RepositoryResult<AssignmentSubject> {
        let subject = raw
            .normalize()
            .map_err(|e| RepositoryError::field("subject", e))?;
        self.upsert(&subject)?;
        Ok(subject)
    }

    pub fn find_by_id(&self, subject_id: &str) -> RepositoryResult<Option<AssignmentSubject>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM assignment_subject s WHERE s.subject_id = ?1",
                    SUBJECT_COLUMNS
                ),
                params![subject_id],
                |row| SubjectRow::read(row, 0),
            )
            .optional()?;
        row.map(SubjectRow::into_subject).transpose()
    }

    /// 租户在服务日期范围内的班次 [from, to](按开始时间排序)
    pub fn find_by_tenant_and_date_range(
        &self,
        tenant_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<AssignmentSubject>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM assignment_subject s
            WHERE s.tenant_id = ?1 AND s.service_date BETWEEN ?2 AND ?3
            ORDER BY s.start_at, s.subject_id
            "#,
            SUBJECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![tenant_id, format_date(from), format_date(to)], |row| {
                SubjectRow::read(row, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SubjectRow::into_subject).collect()
    }

    /// 范围内尚无有效分配的班次(按开始时间排序)
    pub fn find_unassigned_by_tenant_and_date_range(
        &self,
        tenant_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<AssignmentSubject>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM assignment_subject s
            WHERE s.tenant_id = ?1 AND s.service_date BETWEEN ?2 AND ?3
              AND NOT EXISTS (
                SELECT 1 FROM assignment a
                WHERE a.subject_id = s.subject_id AND a.is_active = 1
              )
            ORDER BY s.start_at, s.subject_id
            "#,
            SUBJECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![tenant_id, format_date(from), format_date(to)], |row| {
                SubjectRow::read(row, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SubjectRow::into_subject).collect()
    }
}
