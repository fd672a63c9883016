//! Record query operations.
//!
//! Inserts go through [`RecordStore::commit_record`] so the dedup ledger and
//! record rows can never drift apart; this module covers the read side.

use chrono::NaiveDate;
use rusqlite::{Connection, Row, params};

use epistle_types::{RecordType, StructuredRecord};

use crate::error::{Result, StoreError};

use super::{RecordFilter, RecordStore, SpendingReport, SpendingRow};

/// Columns selected by every record query, in [`row_to_record`] order.
const RECORD_COLUMNS: &str = "id, record_type, source_id, sender, subject, date, \
     body_preview, summary, amount, vendor, due_date, has_attachments, extraction_failed";

impl RecordStore {
    /// Insert a record row on an open connection (used inside transactions).
    pub(crate) fn insert_record_conn(conn: &Connection, record: &StructuredRecord) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO records (
                id, record_type, source_id, sender, subject, date,
                body_preview, summary, amount, vendor, due_date,
                has_attachments, extraction_failed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                record.id,
                record.record_type.as_str(),
                record.source_id,
                record.sender,
                record.subject,
                record.date.to_string(),
                record.body_preview,
                record.summary,
                record.amount,
                record.vendor,
                record.due_date.map(|d| d.to_string()),
                record.has_attachments,
                record.extraction_failed,
            ],
        )?;
        Ok(())
    }

    /// Get a record by id.
    pub fn get_record(&self, id: &str) -> Result<Option<StructuredRecord>> {
        let conn = self.conn.lock().unwrap();

        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row_to_record(row)?))
        } else {
            Ok(None)
        }
    }

    /// Get the record created for a source item, if any.
    pub fn get_record_by_source(&self, source_id: &str) -> Result<Option<StructuredRecord>> {
        let conn = self.conn.lock().unwrap();

        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE source_id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![source_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row_to_record(row)?))
        } else {
            Ok(None)
        }
    }

    /// List records matching a filter, newest first.
    pub fn list_records(&self, filter: &RecordFilter) -> Result<Vec<StructuredRecord>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM records");
        let mut clauses: Vec<String> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(record_type) = filter.record_type {
            params_vec.push(Box::new(record_type.as_str().to_string()));
            clauses.push(format!("record_type = ?{}", params_vec.len()));
        }
        if let Some(since) = filter.since {
            params_vec.push(Box::new(since.to_string()));
            clauses.push(format!("date >= ?{}", params_vec.len()));
        }
        if let Some(until) = filter.until {
            params_vec.push(Box::new(until.to_string()));
            clauses.push(format!("date <= ?{}", params_vec.len()));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY date DESC, id");
        if let Some(limit) = filter.limit {
            params_vec.push(Box::new(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", params_vec.len()));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();
        let mut rows = stmt.query(params_refs.as_slice())?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Case-insensitive substring search over subject, sender, vendor and
    /// summary, newest first.
    pub fn search_records(&self, needle: &str, limit: usize) -> Result<Vec<StructuredRecord>> {
        let conn = self.conn.lock().unwrap();

        let pattern = format!("%{}%", needle.trim());
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM records
            WHERE subject LIKE ?1 OR sender LIKE ?1 OR vendor LIKE ?1 OR summary LIKE ?1
            ORDER BY date DESC, id
            LIMIT ?2
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![pattern, limit as i64])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Count records, optionally restricted to one category.
    pub fn count_records(&self, record_type: Option<RecordType>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = match record_type {
            Some(record_type) => conn.query_row(
                "SELECT COUNT(*) FROM records WHERE record_type = ?1",
                params![record_type.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?,
        };

        Ok(count as usize)
    }

    /// Aggregate spending over financial records with a known amount.
    pub fn spending_report(
        &self,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<SpendingReport> {
        let conn = self.conn.lock().unwrap();

        // Category names come from the enum, not user input.
        let financial: Vec<String> = RecordType::ALL
            .iter()
            .filter(|rt| rt.is_financial())
            .map(|rt| format!("'{}'", rt.as_str()))
            .collect();

        let mut clauses = vec![
            format!("record_type IN ({})", financial.join(", ")),
            "amount IS NOT NULL".to_string(),
        ];
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(since) = since {
            params_vec.push(Box::new(since.to_string()));
            clauses.push(format!("date >= ?{}", params_vec.len()));
        }
        if let Some(until) = until {
            params_vec.push(Box::new(until.to_string()));
            clauses.push(format!("date <= ?{}", params_vec.len()));
        }

        let where_sql = clauses.join(" AND ");
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();

        let (total, record_count): (f64, usize) = {
            let sql =
                format!("SELECT COALESCE(SUM(amount), 0.0), COUNT(*) FROM records WHERE {where_sql}");
            conn.query_row(&sql, params_refs.as_slice(), |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)? as usize))
            })?
        };

        let by_category = {
            let sql = format!(
                "SELECT record_type, SUM(amount), COUNT(*) FROM records
                 WHERE {where_sql}
                 GROUP BY record_type ORDER BY SUM(amount) DESC"
            );
            collect_spending_rows(&conn, &sql, params_refs.as_slice())?
        };

        let by_vendor = {
            let sql = format!(
                "SELECT COALESCE(vendor, sender), SUM(amount), COUNT(*) FROM records
                 WHERE {where_sql}
                 GROUP BY COALESCE(vendor, sender) ORDER BY SUM(amount) DESC"
            );
            collect_spending_rows(&conn, &sql, params_refs.as_slice())?
        };

        Ok(SpendingReport {
            since,
            until,
            total,
            record_count,
            by_category,
            by_vendor,
        })
    }
}

fn collect_spending_rows(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<SpendingRow>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(SpendingRow {
            key: row.get(0)?,
            total: row.get(1)?,
            count: row.get::<_, i64>(2)? as usize,
        });
    }
    Ok(out)
}

/// Map a row in [`RECORD_COLUMNS`] order back onto a [`StructuredRecord`].
fn row_to_record(row: &Row) -> Result<StructuredRecord> {
    let record_type_str: String = row.get(1)?;
    let record_type = RecordType::parse(&record_type_str).ok_or_else(|| {
        StoreError::InvalidData(format!("unknown record type '{record_type_str}'"))
    })?;

    let date_str: String = row.get(5)?;
    let date = date_str
        .parse()
        .map_err(|_| StoreError::InvalidData(format!("invalid record date '{date_str}'")))?;

    let due_date = match row.get::<_, Option<String>>(10)? {
        Some(s) => Some(
            s.parse()
                .map_err(|_| StoreError::InvalidData(format!("invalid due date '{s}'")))?,
        ),
        None => None,
    };

    Ok(StructuredRecord {
        id: row.get(0)?,
        record_type,
        source_id: row.get(2)?,
        sender: row.get(3)?,
        subject: row.get(4)?,
        date,
        body_preview: row.get(6)?,
        summary: row.get(7)?,
        amount: row.get(8)?,
        vendor: row.get(9)?,
        due_date,
        has_attachments: row.get(11)?,
        extraction_failed: row.get(12)?,
    })
}
