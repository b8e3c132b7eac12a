//! `SQLite`-backed emergency store.
//!
//! Uses `switchy_database` with raw SQL. Timestamps are stored as
//! fixed-width RFC 3339 strings so that text ordering matches time
//! ordering.

use std::fmt::Write as _;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use desa_sos_database_models::{
    EmergencyCounts, EmergencyPage, EmergencyQuery, NewEmergency, UserRow,
};
use desa_sos_emergency_models::{EmergencyReport, EmergencyStatus};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use switchy_database_connection::init_sqlite_rusqlite;

use crate::{DbError, EmergencyStore};

/// Default path for the emergency database.
pub const DEFAULT_DB_PATH: &str = "data/emergencies.db";

const REPORT_COLUMNS: &str = "e.id, e.user_id, u.display_name AS reporter_name,
        e.phone_number, e.latitude, e.longitude, e.message, e.status,
        e.created_at, e.updated_at";

/// Emergency store persisted in a `SQLite` database.
pub struct SqliteEmergencyStore {
    db: Box<dyn Database>,
}

impl SqliteEmergencyStore {
    /// Opens (or creates) the database at `path` and ensures the schema
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or schema
    /// creation fails.
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = init_sqlite_rusqlite(Some(path)).map_err(|e| DbError::Open {
            message: e.to_string(),
        })?;

        Self::from_database(db).await
    }

    /// Wraps an already-open connection, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if schema creation fails.
    pub async fn from_database(db: Box<dyn Database>) -> Result<Self, DbError> {
        ensure_schema(db.as_ref()).await?;
        log::debug!("Emergency schema ready");
        Ok(Self { db })
    }

    async fn fetch(&self, id: &str) -> Result<Option<EmergencyReport>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                &format!(
                    "SELECT {REPORT_COLUMNS}
                     FROM emergencies e
                     LEFT JOIN users u ON u.id = e.user_id
                     WHERE e.id = $1"
                ),
                &[DatabaseValue::String(id.to_string())],
            )
            .await?;

        rows.first().map(row_to_report).transpose()
    }
}

/// Creates all tables if they don't already exist.
async fn ensure_schema(db: &dyn Database) -> Result<(), DbError> {
    db.exec_raw(
        "CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            display_name  TEXT NOT NULL,
            phone_number  TEXT
        )",
    )
    .await?;

    db.exec_raw(
        "CREATE TABLE IF NOT EXISTS emergencies (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,
            id            TEXT NOT NULL UNIQUE,
            user_id       TEXT,
            phone_number  TEXT NOT NULL,
            latitude      TEXT NOT NULL DEFAULT '0',
            longitude     TEXT NOT NULL DEFAULT '0',
            message       TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'OPEN',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        )",
    )
    .await?;

    db.exec_raw(
        "CREATE INDEX IF NOT EXISTS idx_emergencies_created
         ON emergencies (created_at, seq)",
    )
    .await?;

    db.exec_raw(
        "CREATE INDEX IF NOT EXISTS idx_emergencies_status
         ON emergencies (status)",
    )
    .await?;

    Ok(())
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Conversion {
            message: format!("Invalid timestamp {raw:?}: {e}"),
        })
}

fn conversion(column: &str, e: impl std::fmt::Display) -> DbError {
    DbError::Conversion {
        message: format!("Failed to read column {column}: {e}"),
    }
}

fn row_to_report(row: &Row) -> Result<EmergencyReport, DbError> {
    let status: String = row.to_value("status").map_err(|e| conversion("status", e))?;
    let status: EmergencyStatus = status.parse().map_err(|_| DbError::Conversion {
        message: format!("Unknown emergency status: {status}"),
    })?;
    let created_at: String = row
        .to_value("created_at")
        .map_err(|e| conversion("created_at", e))?;
    let updated_at: String = row
        .to_value("updated_at")
        .map_err(|e| conversion("updated_at", e))?;

    Ok(EmergencyReport {
        id: row.to_value("id").map_err(|e| conversion("id", e))?,
        user_id: row.to_value("user_id").unwrap_or(None),
        reporter_name: row.to_value("reporter_name").unwrap_or(None),
        phone_number: row
            .to_value("phone_number")
            .map_err(|e| conversion("phone_number", e))?,
        latitude: row
            .to_value("latitude")
            .map_err(|e| conversion("latitude", e))?,
        longitude: row
            .to_value("longitude")
            .map_err(|e| conversion("longitude", e))?,
        message: row
            .to_value("message")
            .map_err(|e| conversion("message", e))?,
        status,
        is_handled: status.is_handled(),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Appends the `WHERE` clause for `query` and returns the bound values.
fn filter_clause(sql: &mut String, query: &EmergencyQuery) -> Vec<DatabaseValue> {
    let mut params = Vec::new();
    sql.push_str(" WHERE 1=1");

    match query.handled {
        Some(true) => {
            write!(sql, " AND e.status = ${}", params.len() + 1).unwrap();
            params.push(DatabaseValue::String(
                EmergencyStatus::Resolved.as_ref().to_string(),
            ));
        }
        Some(false) => {
            write!(sql, " AND e.status <> ${}", params.len() + 1).unwrap();
            params.push(DatabaseValue::String(
                EmergencyStatus::Resolved.as_ref().to_string(),
            ));
        }
        None => {}
    }

    if let Some(status) = query.status {
        write!(sql, " AND e.status = ${}", params.len() + 1).unwrap();
        params.push(DatabaseValue::String(status.as_ref().to_string()));
    }

    params
}

#[async_trait]
impl EmergencyStore for SqliteEmergencyStore {
    async fn insert(&self, new: NewEmergency) -> Result<EmergencyReport, DbError> {
        let created_at = format_timestamp(new.created_at);

        self.db
            .exec_raw_params(
                "INSERT INTO emergencies (
                    id, user_id, phone_number, latitude, longitude,
                    message, status, created_at, updated_at
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
                &[
                    DatabaseValue::String(new.id.clone()),
                    new.user_id
                        .clone()
                        .map_or(DatabaseValue::Null, DatabaseValue::String),
                    DatabaseValue::String(new.phone_number.clone()),
                    DatabaseValue::String(new.coordinates.latitude.clone()),
                    DatabaseValue::String(new.coordinates.longitude.clone()),
                    DatabaseValue::String(new.message.clone()),
                    DatabaseValue::String(EmergencyStatus::Open.as_ref().to_string()),
                    DatabaseValue::String(created_at),
                ],
            )
            .await?;

        self.fetch(&new.id).await?.ok_or_else(|| DbError::Conversion {
            message: format!("Inserted emergency {} could not be read back", new.id),
        })
    }

    async fn get(&self, id: &str) -> Result<Option<EmergencyReport>, DbError> {
        self.fetch(id).await
    }

    async fn list(&self, query: &EmergencyQuery) -> Result<EmergencyPage, DbError> {
        let mut count_sql = String::from("SELECT COUNT(*) AS cnt FROM emergencies e");
        let count_params = filter_clause(&mut count_sql, query);
        let rows = self.db.query_raw_params(&count_sql, &count_params).await?;
        let total: i64 = rows.first().map_or(0, |r| r.to_value("cnt").unwrap_or(0));

        let mut sql = format!(
            "SELECT {REPORT_COLUMNS}
             FROM emergencies e
             LEFT JOIN users u ON u.id = e.user_id"
        );
        let mut params = filter_clause(&mut sql, query);
        write!(
            sql,
            " ORDER BY e.created_at DESC, e.seq DESC LIMIT ${} OFFSET ${}",
            params.len() + 1,
            params.len() + 2,
        )
        .unwrap();
        params.push(DatabaseValue::Int32(
            i32::try_from(query.limit).unwrap_or(i32::MAX),
        ));
        params.push(DatabaseValue::Int32(
            i32::try_from(query.offset).unwrap_or(i32::MAX),
        ));

        let rows = self.db.query_raw_params(&sql, &params).await?;
        let reports = rows
            .iter()
            .map(row_to_report)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EmergencyPage {
            reports,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn count(&self) -> Result<EmergencyCounts, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT status, COUNT(*) AS cnt FROM emergencies GROUP BY status",
                &[],
            )
            .await?;

        let mut counts = EmergencyCounts::default();
        for row in &rows {
            let status: String = row.to_value("status").unwrap_or_default();
            let cnt: i64 = row.to_value("cnt").unwrap_or(0);
            match status.parse::<EmergencyStatus>() {
                Ok(status) => counts.add(status, u64::try_from(cnt).unwrap_or(0)),
                Err(_) => log::warn!("Skipping {cnt} emergencies with unknown status {status:?}"),
            }
        }

        Ok(counts)
    }

    async fn update_status(
        &self,
        id: &str,
        status: EmergencyStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<EmergencyReport>, DbError> {
        let allowed = status.predecessors();
        if allowed.is_empty() {
            return Ok(None);
        }

        let mut sql = String::from(
            "UPDATE emergencies SET status = $2, updated_at = $3 WHERE id = $1 AND status IN (",
        );
        let mut params = vec![
            DatabaseValue::String(id.to_string()),
            DatabaseValue::String(status.as_ref().to_string()),
            DatabaseValue::String(format_timestamp(at)),
        ];
        for (i, from) in allowed.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            write!(sql, "${}", params.len() + 1).unwrap();
            params.push(DatabaseValue::String(from.as_ref().to_string()));
        }
        sql.push(')');

        let updated = self.db.exec_raw_params(&sql, &params).await?;

        if updated == 0 {
            return Ok(None);
        }

        self.fetch(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let deleted = self
            .db
            .exec_raw_params(
                "DELETE FROM emergencies WHERE id = $1",
                &[DatabaseValue::String(id.to_string())],
            )
            .await?;

        Ok(deleted > 0)
    }

    async fn upsert_user(&self, user: &UserRow) -> Result<(), DbError> {
        self.db
            .exec_raw_params(
                "INSERT INTO users (id, display_name, phone_number)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (id) DO UPDATE SET
                   display_name = excluded.display_name,
                   phone_number = excluded.phone_number",
                &[
                    DatabaseValue::String(user.id.clone()),
                    DatabaseValue::String(user.display_name.clone()),
                    user.phone_number
                        .clone()
                        .map_or(DatabaseValue::Null, DatabaseValue::String),
                ],
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use desa_sos_emergency_models::Coordinates;

    use super::*;

    async fn temp_store() -> (SqliteEmergencyStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "desa_sos_emergencies_{}.db",
            uuid::Uuid::new_v4()
        ));
        let store = SqliteEmergencyStore::open(&path).await.unwrap();
        (store, path)
    }

    fn new_emergency(id: &str, at: DateTime<Utc>, coordinates: Coordinates) -> NewEmergency {
        NewEmergency {
            id: id.to_string(),
            user_id: Some("warga-1".to_string()),
            phone_number: "+6281234567890".to_string(),
            coordinates,
            message: "Terjadi banjir, butuh bantuan evakuasi".to_string(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn insert_list_update_delete() {
        let (store, path) = temp_store().await;
        store
            .upsert_user(&UserRow {
                id: "warga-1".to_string(),
                display_name: "Siti Aminah".to_string(),
                phone_number: Some("+6281234567890".to_string()),
            })
            .await
            .unwrap();

        let base = Utc::now();
        let coords = Coordinates::parse(Some("-7.2575120"), Some("112.7521000")).unwrap();
        store
            .insert(new_emergency("first", base, coords.clone()))
            .await
            .unwrap();
        let second = store
            .insert(new_emergency(
                "second",
                base + Duration::seconds(5),
                Coordinates::unresolved(),
            ))
            .await
            .unwrap();
        assert_eq!(second.status, EmergencyStatus::Open);
        assert_eq!(second.reporter_name.as_deref(), Some("Siti Aminah"));

        let page = store
            .list(&EmergencyQuery {
                limit: 10,
                ..EmergencyQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        let ids: Vec<&str> = page.reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["second", "first"]);
        assert_eq!(page.reports[1].latitude, "-7.2575120");
        assert_eq!(page.reports[1].longitude, "112.7521000");
        assert_eq!(page.reports[0].latitude, "0");

        let resolved = store
            .update_status("first", EmergencyStatus::Resolved, base + Duration::seconds(9))
            .await
            .unwrap()
            .unwrap();
        assert!(resolved.is_handled);

        let unhandled = store
            .list(&EmergencyQuery {
                handled: Some(false),
                limit: 10,
                ..EmergencyQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(unhandled.total, 1);
        assert_eq!(unhandled.reports[0].id, "second");

        let counts = store.count().await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.resolved, 1);
        assert_eq!(counts.unhandled, 1);

        assert!(store.delete("second").await.unwrap());
        assert!(!store.delete("second").await.unwrap());
        assert!(
            store
                .update_status("second", EmergencyStatus::Resolved, base)
                .await
                .unwrap()
                .is_none()
        );

        drop(store);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn update_refuses_to_move_backwards() {
        let (store, path) = temp_store().await;
        let at = Utc::now();
        store
            .insert(new_emergency("a", at, Coordinates::unresolved()))
            .await
            .unwrap();
        let resolved = store
            .update_status("a", EmergencyStatus::Resolved, at + Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();

        for status in [EmergencyStatus::InProgress, EmergencyStatus::Open] {
            assert!(
                store
                    .update_status("a", status, at + Duration::seconds(2))
                    .await
                    .unwrap()
                    .is_none()
            );
        }
        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.status, EmergencyStatus::Resolved);
        assert_eq!(stored.updated_at, resolved.updated_at);

        drop(store);
        let _ = std::fs::remove_file(path);
    }
}
