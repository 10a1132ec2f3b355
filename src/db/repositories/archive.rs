use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u32},
    models::ArchivedSubject,
};
use crate::models::{ViolationKind, ViolationRecord};
use crate::relay::SubjectRecord;

const SELECT_COLUMNS: &str = "SELECT id, subject_id, name, engagement, violations_json,
        left_desk_count, looked_down_count, last_update, archived_at
 FROM subject_archive";

fn row_to_archived(row: &Row) -> Result<ArchivedSubject> {
    let engagement: i64 = row.get("engagement")?;
    let violations_json: String = row.get("violations_json")?;
    let last_update: String = row.get("last_update")?;
    let archived_at: String = row.get("archived_at")?;

    let violations: Vec<ViolationRecord> = serde_json::from_str(&violations_json)
        .context("failed to parse archived violations")?;

    Ok(ArchivedSubject {
        id: row.get("id")?,
        subject_id: row.get("subject_id")?,
        name: row.get("name")?,
        engagement: u8::try_from(engagement)
            .map_err(|_| anyhow!("engagement out of range: {engagement}"))?,
        violations,
        left_desk_count: to_u32(row.get("left_desk_count")?, "left_desk_count")?,
        looked_down_count: to_u32(row.get("looked_down_count")?, "looked_down_count")?,
        last_update: parse_datetime(&last_update, "last_update")?,
        archived_at: parse_datetime(&archived_at, "archived_at")?,
    })
}

fn collect_rows(mut rows: rusqlite::Rows<'_>) -> Result<Vec<ArchivedSubject>> {
    let mut archived = Vec::new();
    while let Some(row) = rows.next()? {
        archived.push(row_to_archived(row)?);
    }
    Ok(archived)
}

impl Database {
    /// Store the final state of a subject that left the roster.
    /// Counts are derived from the violation log.
    pub async fn archive_subject(&self, record: &SubjectRecord) -> Result<ArchivedSubject> {
        let record = record.clone();
        self.execute(move |conn| {
            let archived_at = Utc::now();
            let violations_json = serde_json::to_string(&record.violations)
                .context("failed to serialize violations")?;
            let left_desk_count = record.count_of(ViolationKind::LeftDesk) as u32;
            let looked_down_count = record.count_of(ViolationKind::LookingDown) as u32;

            conn.execute(
                "INSERT INTO subject_archive
                    (subject_id, name, engagement, violations_json, left_desk_count,
                     looked_down_count, last_update, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.name,
                    record.engagement,
                    violations_json,
                    left_desk_count,
                    looked_down_count,
                    record.last_update.to_rfc3339(),
                    archived_at.to_rfc3339(),
                ],
            )
            .context("failed to insert archived subject")?;

            Ok(ArchivedSubject {
                id: conn.last_insert_rowid(),
                subject_id: record.id,
                name: record.name,
                engagement: record.engagement,
                violations: record.violations,
                left_desk_count,
                looked_down_count,
                last_update: record.last_update,
                archived_at,
            })
        })
        .await
    }

    /// Most recent first.
    pub async fn list_archived(&self, limit: u32) -> Result<Vec<ArchivedSubject>> {
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"))?;
            let rows = stmt.query(params![limit])?;
            collect_rows(rows)
        })
        .await
    }

    pub async fn get_archived_for_subject(&self, subject_id: &str) -> Result<Vec<ArchivedSubject>> {
        let subject_id = subject_id.to_string();
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} WHERE subject_id = ?1 ORDER BY id DESC"))?;
            let rows = stmt.query(params![subject_id])?;
            collect_rows(rows)
        })
        .await
    }
}
