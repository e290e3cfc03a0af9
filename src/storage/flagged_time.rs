use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

use super::Store;

/// A plugin run requested for a later point in time
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedTimeRecord {
    pub id: i64,
    pub plugin_name: String,
    pub due_at: DateTime<Utc>,
    /// Raw JSON as stored; decoded by the time-trigger sweep
    pub plugin_data: Option<String>,
}

impl FlaggedTimeRecord {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

impl Store {
    /// Flag `plugin_name` for execution once `due_at` has passed.
    pub async fn flag_time(
        &self,
        plugin_name: &str,
        due_at: DateTime<Utc>,
        plugin_data: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let data = plugin_data
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode plugin data")?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO flagged_time (plugin_name, due_at, plugin_data) VALUES (?1, ?2, ?3)",
            rusqlite::params![plugin_name, due_at.timestamp_millis(), data],
        )
        .context("Failed to insert flagged time record")?;
        Ok(conn.last_insert_rowid())
    }

    /// All flagged records, earliest due first.
    pub async fn list_flagged_time(&self) -> Result<Vec<FlaggedTimeRecord>> {
        let conn = self.conn.lock().await;
        query_flagged(&conn)
    }

    pub async fn count_flagged_time(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT count(*) FROM flagged_time", [], |row| row.get(0))
            .context("Failed to count flagged time records")?;
        Ok(count as usize)
    }

    /// Returns false when the record was already gone.
    pub async fn delete_flagged_time(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let removed = conn
            .execute(
                "DELETE FROM flagged_time WHERE id = ?1",
                rusqlite::params![id],
            )
            .context("Failed to delete flagged time record")?;
        Ok(removed > 0)
    }
}

// Takes &Connection directly (caller already holds the lock).
fn query_flagged(conn: &Connection) -> Result<Vec<FlaggedTimeRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, plugin_name, due_at, plugin_data
             FROM flagged_time
             ORDER BY due_at ASC, id ASC",
        )
        .context("Failed to prepare flagged time query")?;
    let rows = stmt
        .query_map([], |row| {
            let millis: i64 = row.get(2)?;
            Ok((row.get(0)?, row.get(1)?, millis, row.get(3)?))
        })
        .context("Failed to map rows")?
        .collect::<rusqlite::Result<Vec<(i64, String, i64, Option<String>)>>>()
        .context("Failed to collect rows")?;

    rows.into_iter()
        .map(|(id, plugin_name, millis, plugin_data)| {
            let due_at = Utc
                .timestamp_millis_opt(millis)
                .single()
                .with_context(|| format!("Invalid due_at {} for record {}", millis, id))?;
            Ok(FlaggedTimeRecord {
                id,
                plugin_name,
                due_at,
                plugin_data,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_flag_and_list_orders_by_due_time() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();

        store
            .flag_time("late", now + Duration::hours(1), None)
            .await
            .unwrap();
        store
            .flag_time("early", now - Duration::minutes(5), Some(&json!({"chat_id": 7})))
            .await
            .unwrap();

        let records = store.list_flagged_time().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].plugin_name, "early");
        assert_eq!(records[0].plugin_data.as_deref(), Some(r#"{"chat_id":7}"#));
        assert!(records[0].is_due(now));
        assert_eq!(records[1].plugin_name, "late");
        assert!(records[1].plugin_data.is_none());
        assert!(!records[1].is_due(now));
    }

    #[tokio::test]
    async fn test_due_time_keeps_milliseconds() {
        let store = Store::open_in_memory().unwrap();
        let due = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();
        store.flag_time("ping", due, None).await.unwrap();

        let record = &store.list_flagged_time().await.unwrap()[0];
        assert_eq!(record.due_at, due);
        assert!(!record.is_due(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()));
        assert!(record.is_due(due));
    }

    #[tokio::test]
    async fn test_delete_reports_whether_row_existed() {
        let store = Store::open_in_memory().unwrap();
        let id = store.flag_time("ping", Utc::now(), None).await.unwrap();

        assert!(store.delete_flagged_time(id).await.unwrap());
        assert!(!store.delete_flagged_time(id).await.unwrap());
        assert_eq!(store.count_flagged_time().await.unwrap(), 0);
    }
}
