use rusqlite::{params, Connection};
use uuid::Uuid;

use printvault_core::events::{Event, EventKind};

use super::{fmt_dt, parse_dt};

/// Append an event record. Events are immutable; there is no update path.
pub fn insert_event(conn: &Connection, event: &Event) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO events (id, event_type, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            event.id.to_string(),
            event.kind.to_string(),
            event.payload.to_string(),
            fmt_dt(&event.created_at),
        ],
    )?;
    Ok(())
}

pub fn list_events(conn: &Connection, limit: u32) -> anyhow::Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, event_type, payload, created_at FROM events
         ORDER BY created_at DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], row_to_event)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_events_by_kind(
    conn: &Connection,
    kind: EventKind,
    limit: u32,
) -> anyhow::Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, event_type, payload, created_at FROM events
         WHERE event_type = ?1 ORDER BY created_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![kind.to_string(), limit], row_to_event)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let payload_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;
    Ok(Event {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        kind: kind_str.parse().unwrap_or(EventKind::JobFailed),
        payload: serde_json::from_str(&payload_str).unwrap_or_default(),
        created_at: parse_dt(&created_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;
    use printvault_core::models::job::JobId;

    #[test]
    fn test_events_append_and_filter() {
        let conn = open_memory_db().unwrap();
        let job_id = JobId::new();
        insert_event(&conn, &Event::job_failed(&job_id, "boom")).unwrap();
        insert_event(&conn, &Event::printer_online("printer_1")).unwrap();

        assert_eq!(list_events(&conn, 10).unwrap().len(), 2);

        let failures = list_events_by_kind(&conn, EventKind::JobFailed, 10).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].payload["error"], "boom");
    }
}
