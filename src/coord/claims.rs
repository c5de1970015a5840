//! Claim store: append-only claim, unclaim and session lifecycle events, and
//! the active-claim view built from them.

use super::Coordinator;
use super::aggregate::{claim_record, fold_active_claims};
use crate::db::{Column, MemoryRow, NewMemory, Query, StoreResult, now_ms};
use crate::similarity::{file_overlap, percent, short_agent_name, text_similarity};
use crate::types::{
    ActiveClaim, AgentContext, ClaimMeta, ClaimRecord, EventKind, RESOURCE_MESSAGE_TYPE,
    SessionOutcome,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Another agent's live claim that overlaps a scope being claimed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimConflict {
    pub agent: String,
    pub short_name: String,
    pub scope: String,
    pub similarity: f64,
    pub percent: u32,
    /// Whether the similarity alone reached the contention threshold.
    pub scope_overlap: bool,
    pub shared_files: Vec<String>,
}

/// A file that already has the maximum number of live claimants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockedFile {
    pub file: String,
    pub holders: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// The claim was written. Conflicts are advisory.
    Recorded {
        claim: ClaimRecord,
        conflicts: Vec<ClaimConflict>,
        others: Vec<ActiveClaim>,
    },
    /// Nothing was written.
    Locked { files: Vec<LockedFile> },
}

impl Coordinator {
    fn resource_query(&self, ctx: &AgentContext) -> Query {
        Query::new()
            .eq(Column::FoldId, ctx.fold_id.clone())
            .eq(Column::MessageType, RESOURCE_MESSAGE_TYPE.to_string())
    }

    fn append_event(
        &self,
        ctx: &AgentContext,
        metadata: Map<String, Value>,
        content: String,
    ) -> StoreResult<MemoryRow> {
        self.store.insert(NewMemory {
            fold_id: ctx.fold_id.clone(),
            agent: ctx.agent.clone(),
            session_id: Some(ctx.session_id.clone()),
            message_type: RESOURCE_MESSAGE_TYPE.to_string(),
            content: Some(content),
            metadata,
            ts: now_ms(),
        })
    }

    /// Append a claim event for the caller. No checks.
    pub fn record_claim(
        &self,
        ctx: &AgentContext,
        scope: &str,
        files: &[String],
        task_id: Option<&str>,
    ) -> StoreResult<ClaimRecord> {
        let meta = ClaimMeta {
            event: EventKind::Claim.as_str().to_string(),
            scope: scope.to_string(),
            files: files.to_vec(),
            user: Some(ctx.user.clone()),
            task_id: task_id.map(str::to_string),
        };
        let metadata = json_map(serde_json::to_value(&meta)?);
        let content = if files.is_empty() {
            format!("CLAIM: {}", scope)
        } else {
            format!("CLAIM: {} [{}]", scope, files.join(", "))
        };
        let row = self.append_event(ctx, metadata, content)?;
        debug!(fold = %ctx.fold_id, agent = %ctx.agent, claim_id = %row.id, "Claim recorded");
        Ok(claim_record(&row)?)
    }

    /// Release every earlier claim of the caller.
    pub fn unclaim(&self, ctx: &AgentContext) -> StoreResult<()> {
        let metadata = json_map(json!({
            "event": EventKind::Unclaim.as_str(),
            "user": ctx.user,
        }));
        self.append_event(ctx, metadata, "UNCLAIM: Work claim released.".to_string())?;
        info!(fold = %ctx.fold_id, agent = %ctx.agent, "Claims released");
        Ok(())
    }

    /// End the caller's session, releasing every claim made in it. With an
    /// outcome the event is `session_done`, else `session_end`.
    pub fn end_session(
        &self,
        ctx: &AgentContext,
        summary: Option<&str>,
        outcome: Option<SessionOutcome>,
    ) -> StoreResult<EventKind> {
        let kind = match outcome {
            Some(_) => EventKind::SessionDone,
            None => EventKind::SessionEnd,
        };

        let mut metadata = json_map(json!({
            "event": kind.as_str(),
            "user": ctx.user,
        }));
        if let Some(summary) = summary {
            metadata.insert("summary".to_string(), Value::from(summary));
        }
        if let Some(outcome) = outcome {
            metadata.insert("status".to_string(), Value::from(outcome.as_str()));
        }

        let content = match summary {
            Some(s) if !s.is_empty() => format!("SESSION END: {}", s),
            _ => "SESSION END".to_string(),
        };
        self.append_event(ctx, metadata, content)?;
        info!(fold = %ctx.fold_id, session = %ctx.session_id, event = kind.as_str(), "Session ended");
        Ok(kind)
    }

    /// Live claims of the fold, one per agent, newest first.
    pub fn active_claims(
        &self,
        ctx: &AgentContext,
        exclude: Option<&str>,
    ) -> StoreResult<Vec<ActiveClaim>> {
        let claims = self.store.select(
            &self
                .resource_query(ctx)
                .eq(Column::Meta("event"), EventKind::Claim.as_str().to_string())
                .gte(Column::Ts, self.claim_window_start())
                .limit(self.settings.claim_scan_limit),
        )?;
        if claims.is_empty() {
            return Ok(Vec::new());
        }

        let agents: BTreeSet<String> = claims.iter().map(|r| r.agent.clone()).collect();
        let sessions: BTreeSet<String> =
            claims.iter().filter_map(|r| r.session_id.clone()).collect();

        let mut terminators = self.store.select(
            &self
                .resource_query(ctx)
                .eq(Column::Meta("event"), EventKind::Unclaim.as_str().to_string())
                .any_of(Column::Agent, agents)
                .limit(self.settings.terminator_scan_limit),
        )?;
        if !sessions.is_empty() {
            terminators.extend(self.store.select(
                &self
                    .resource_query(ctx)
                    .any_of(
                        Column::Meta("event"),
                        [EventKind::SessionEnd, EventKind::SessionDone]
                            .map(|k| k.as_str().to_string()),
                    )
                    .any_of(Column::SessionId, sessions)
                    .limit(self.settings.terminator_scan_limit),
            )?);
        }

        let mut active = fold_active_claims(&claims, &terminators, exclude);

        if let Some(idle) = self.settings.idle_window() {
            let cutoff = now_ms() - idle.as_millis() as i64;
            let recently_seen: HashSet<String> = self
                .store
                .select(
                    &Query::new()
                        .eq(Column::FoldId, ctx.fold_id.clone())
                        .any_of(Column::Agent, active.iter().map(|c| c.agent.clone()))
                        .gte(Column::Ts, cutoff),
                )?
                .into_iter()
                .map(|r| r.agent)
                .collect();
            active.retain(|c| recently_seen.contains(&c.agent));
        }

        Ok(active)
    }

    /// Claims in `claims` whose scope is close to `scope` or that share a file.
    pub fn detect_conflicts(
        &self,
        scope: &str,
        files: &[String],
        claims: &[ActiveClaim],
    ) -> Vec<ClaimConflict> {
        claims
            .iter()
            .filter_map(|claim| {
                let score = text_similarity(scope, &claim.scope);
                let shared_files = file_overlap(files, &claim.files);
                let scope_overlap = score >= self.settings.contention_threshold;
                if !scope_overlap && shared_files.is_empty() {
                    return None;
                }
                Some(ClaimConflict {
                    agent: claim.agent.clone(),
                    short_name: short_agent_name(&claim.agent).to_string(),
                    scope: claim.scope.clone(),
                    similarity: score,
                    percent: percent(score),
                    scope_overlap,
                    shared_files,
                })
            })
            .collect()
    }

    /// Claim a free-text scope for the caller.
    ///
    /// Refused when any of `files` already has `max_file_claimants` other live
    /// claimants. Otherwise the claim is written and overlapping claims of
    /// other agents are reported alongside.
    pub fn claim_scope(
        &self,
        ctx: &AgentContext,
        scope: &str,
        files: &[String],
        task_id: Option<&str>,
    ) -> StoreResult<ClaimOutcome> {
        let others = self.active_claims(ctx, Some(&ctx.agent))?;

        if self.settings.max_file_claimants > 0 {
            let locked: Vec<LockedFile> = files
                .iter()
                .filter_map(|file| {
                    let holders: Vec<String> = others
                        .iter()
                        .filter(|c| c.files.contains(file))
                        .map(|c| c.agent.clone())
                        .collect();
                    (holders.len() >= self.settings.max_file_claimants).then(|| LockedFile {
                        file: file.clone(),
                        holders,
                    })
                })
                .collect();
            if !locked.is_empty() {
                info!(fold = %ctx.fold_id, agent = %ctx.agent, files = locked.len(), "Claim refused, files locked");
                return Ok(ClaimOutcome::Locked { files: locked });
            }
        }

        let claim = self.record_claim(ctx, scope, files, task_id)?;
        let conflicts = self.detect_conflicts(scope, files, &others);
        Ok(ClaimOutcome::Recorded {
            claim,
            conflicts,
            others,
        })
    }
}

fn json_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
