//! The claim aggregation view.
//!
//! Claims are never updated or deleted. Whether a claim is still live is
//! decided here, at read time, from the claim events and the unclaim /
//! session-end events that may have terminated them. "Later" always means a
//! higher insertion sequence, never a later timestamp.

use crate::db::MemoryRow;
use crate::types::{ActiveClaim, ClaimMeta, ClaimRecord, EventKind};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Newest terminator sequence per agent (unclaim) and per session (session end).
#[derive(Debug, Default)]
struct Terminators<'a> {
    by_agent: HashMap<&'a str, i64>,
    by_session: HashMap<&'a str, i64>,
}

impl<'a> Terminators<'a> {
    fn collect(rows: &'a [MemoryRow]) -> Self {
        let mut terms = Self::default();
        for row in rows {
            let Some(kind) = row.meta_str("event").and_then(EventKind::parse) else {
                continue;
            };
            if kind == EventKind::Unclaim {
                let seq = terms.by_agent.entry(row.agent.as_str()).or_insert(row.seq);
                *seq = (*seq).max(row.seq);
            } else if kind.ends_session() {
                if let Some(ref session) = row.session_id {
                    let seq = terms.by_session.entry(session.as_str()).or_insert(row.seq);
                    *seq = (*seq).max(row.seq);
                }
            }
        }
        terms
    }

    fn ends(&self, claim: &MemoryRow) -> bool {
        let unclaimed = self
            .by_agent
            .get(claim.agent.as_str())
            .is_some_and(|&seq| seq > claim.seq);
        let session_over = claim
            .session_id
            .as_deref()
            .and_then(|s| self.by_session.get(s))
            .is_some_and(|&seq| seq > claim.seq);
        unclaimed || session_over
    }
}

/// Decode the metadata of a claim row.
pub fn claim_meta(row: &MemoryRow) -> serde_json::Result<ClaimMeta> {
    serde_json::from_value(serde_json::Value::Object(row.metadata.clone()))
}

/// A claim row as a `ClaimRecord`.
pub fn claim_record(row: &MemoryRow) -> serde_json::Result<ClaimRecord> {
    let meta = claim_meta(row)?;
    Ok(ClaimRecord {
        id: row.id.clone(),
        agent: row.agent.clone(),
        scope: meta.scope,
        files: meta.files,
        session_id: row.session_id.clone(),
        task_id: meta.task_id,
        created_at: row.ts,
    })
}

/// Fold claim events into the newest live claim per agent.
///
/// `claims` and `terminators` are rows of one fold; their order does not
/// matter. A claim is skipped when its agent is `exclude`, when its agent
/// unclaimed later, or when its session ended later. The first claim of an
/// agent that survives those checks, newest first, is that agent's active
/// claim; an agent whose newest claim was terminated can still surface an
/// older claim from another session that was not. Result is newest first.
pub fn fold_active_claims(
    claims: &[MemoryRow],
    terminators: &[MemoryRow],
    exclude: Option<&str>,
) -> Vec<ActiveClaim> {
    let terms = Terminators::collect(terminators);

    let mut ordered: Vec<&MemoryRow> = claims.iter().collect();
    ordered.sort_by(|a, b| b.seq.cmp(&a.seq));

    let mut seen: HashSet<&str> = HashSet::new();
    let mut active = Vec::new();

    for row in ordered {
        if exclude == Some(row.agent.as_str()) || seen.contains(row.agent.as_str()) {
            continue;
        }
        if terms.ends(row) {
            continue;
        }
        let meta = match claim_meta(row) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(claim_id = %row.id, error = %e, "Skipping malformed claim row");
                continue;
            }
        };

        seen.insert(row.agent.as_str());
        active.push(ActiveClaim {
            agent: row.agent.clone(),
            scope: meta.scope,
            files: meta.files,
            session_id: row.session_id.clone(),
            task_id: meta.task_id,
            created_at: row.ts,
        });
    }

    active
}
