use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub detail: String,
    pub created_at: String,
}

/// Appends one entry. `seq` keeps ordering stable when timestamps collide.
pub fn record(conn: &Connection, actor: &str, action: &str, detail: &str, now: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO activity_logs(id, actor, action, detail, created_at, seq)
         VALUES(?, ?, ?, ?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM activity_logs))",
        (Uuid::new_v4().to_string(), actor, action, detail, now),
    )?;
    Ok(())
}

/// Newest first.
pub fn list(conn: &Connection, limit: usize) -> anyhow::Result<Vec<ActivityEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, actor, action, detail, created_at
         FROM activity_logs
         ORDER BY seq DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit as i64], |r| {
            Ok(ActivityEntry {
                id: r.get(0)?,
                actor: r.get(1)?,
                action: r.get(2)?,
                detail: r.get(3)?,
                created_at: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
