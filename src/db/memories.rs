//! `RecordStore` implementation over the SQLite `memories` table.

use super::{Database, MemoryRow, NewMemory, Patch, Query, RecordStore, StoreResult};
use rusqlite::{params, params_from_iter, Row};
use serde_json::{Map, Value};
use uuid::Uuid;

const COLUMNS: &str = "seq, id, fold_id, agent, session_id, message_type, content, metadata, ts";

fn parse_memory_row(row: &Row) -> rusqlite::Result<(MemoryRow, String)> {
    let metadata_json: String = row.get("metadata")?;
    Ok((
        MemoryRow {
            seq: row.get("seq")?,
            id: row.get("id")?,
            fold_id: row.get("fold_id")?,
            agent: row.get("agent")?,
            session_id: row.get("session_id")?,
            message_type: row.get("message_type")?,
            content: row.get("content")?,
            metadata: Map::new(),
            ts: row.get("ts")?,
        },
        metadata_json,
    ))
}

/// Decode the metadata column. Non-object JSON is treated as an empty map.
fn decode_metadata(json: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

impl RecordStore for Database {
    fn select(&self, query: &Query) -> StoreResult<Vec<MemoryRow>> {
        let (where_sql, params) = query.where_clause();
        let mut sql = format!(
            "SELECT {} FROM memories WHERE {} ORDER BY {}",
            COLUMNS,
            where_sql,
            query.order_clause()
        );
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map(params_from_iter(params.iter()), parse_memory_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            raw.into_iter()
                .map(|(mut row, metadata_json)| {
                    row.metadata = decode_metadata(&metadata_json)?;
                    Ok(row)
                })
                .collect()
        })
    }

    fn insert(&self, record: NewMemory) -> StoreResult<MemoryRow> {
        let id = Uuid::now_v7().to_string();
        let metadata_json = serde_json::to_string(&record.metadata)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memories (id, fold_id, agent, session_id, message_type, content, metadata, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    &id,
                    &record.fold_id,
                    &record.agent,
                    &record.session_id,
                    &record.message_type,
                    &record.content,
                    &metadata_json,
                    record.ts,
                ],
            )?;
            let seq = conn.last_insert_rowid();

            Ok(MemoryRow {
                seq,
                id,
                fold_id: record.fold_id,
                agent: record.agent,
                session_id: record.session_id,
                message_type: record.message_type,
                content: record.content,
                metadata: record.metadata,
                ts: record.ts,
            })
        })
    }

    fn update(&self, query: &Query, patch: &Patch) -> StoreResult<usize> {
        if patch.metadata.is_none() && patch.content.is_none() {
            return Ok(0);
        }

        let (where_sql, mut params) = query.where_clause();
        let mut sets = Vec::new();
        if let Some(ref metadata) = patch.metadata {
            params.push(serde_json::to_string(metadata)?.into());
            sets.push(format!("metadata = ?{}", params.len()));
        }
        if let Some(ref content) = patch.content {
            params.push(content.clone().into());
            sets.push(format!("content = ?{}", params.len()));
        }

        let sql = format!("UPDATE memories SET {} WHERE {}", sets.join(", "), where_sql);

        self.with_conn(|conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
    }
}
