//! Claim tools: claim, unclaim, end_session and the live-claims view.

use super::{ToolContext, ToolOutput, get_parsed, get_string, get_string_array, make_tool, require_string};
use crate::coord::{ClaimOutcome, Coordinator};
use crate::db::now_ms;
use crate::format::{format_claim, format_claims, format_session_end};
use crate::types::{AgentContext, SessionOutcome};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "claim",
            "Claim a scope of work so other agents know not to duplicate it. Reports agents already working on overlapping scope or files. Refused if a file already has too many claimants.",
            json!({
                "scope": {
                    "type": "string",
                    "description": "What you're working on, in a few words"
                },
                "files": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "File paths you plan to modify"
                },
                "task_id": { "type": "string", "description": "Task this claim is for" }
            }),
            vec!["scope"],
        ),
        make_tool(
            "unclaim",
            "Release your current work claim, e.g. when switching tasks.",
            json!({}),
            vec![],
        ),
        make_tool(
            "end_session",
            "End your session. Every claim made in it is released.",
            json!({
                "summary": { "type": "string", "description": "What was accomplished" },
                "status": {
                    "type": "string",
                    "enum": ["completed", "blocked", "failed", "partial"],
                    "description": "Session outcome"
                }
            }),
            vec![],
        ),
        make_tool(
            "list_claims",
            "Show what other agents are working on right now.",
            json!({
                "include_self": { "type": "boolean", "description": "Include your own claim" }
            }),
            vec![],
        ),
    ]
}

pub fn claim(
    coord: &Coordinator,
    agent: &AgentContext,
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolOutput> {
    let scope = require_string(&args, "scope")?;
    let files = get_string_array(&args, "files").unwrap_or_default();
    let task_id = get_string(&args, "task_id");

    let outcome = coord.claim_scope(agent, &scope, &files, task_id.as_deref())?;
    match outcome {
        ClaimOutcome::Locked { ref files } => ctx
            .logger
            .warning(&format!("Claim refused, {} file(s) locked", files.len())),
        ClaimOutcome::Recorded { ref conflicts, .. } if !conflicts.is_empty() => ctx
            .logger
            .warning(&format!("Claim overlaps {} other agent(s)", conflicts.len())),
        _ => {}
    }
    ToolOutput::new(format_claim(&scope, &files, &outcome), &outcome)
}

pub fn unclaim(coord: &Coordinator, agent: &AgentContext) -> Result<ToolOutput> {
    coord.unclaim(agent)?;
    ToolOutput::new(
        "Work claim released.".to_string(),
        &json!({ "result": "released", "agent": agent.agent }),
    )
}

pub fn end_session(coord: &Coordinator, agent: &AgentContext, args: Value) -> Result<ToolOutput> {
    let summary = get_string(&args, "summary");
    let outcome: Option<SessionOutcome> = get_parsed(&args, "status")?;

    let kind = coord.end_session(agent, summary.as_deref(), outcome)?;
    ToolOutput::new(
        format_session_end(kind, summary.as_deref()),
        &json!({
            "result": kind.as_str(),
            "session_id": agent.session_id,
            "status": outcome,
        }),
    )
}

pub fn list_claims(coord: &Coordinator, agent: &AgentContext, args: Value) -> Result<ToolOutput> {
    let exclude = if args
        .get("include_self")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        None
    } else {
        Some(agent.agent.as_str())
    };

    let claims = coord.active_claims(agent, exclude)?;
    ToolOutput::new(format_claims(&claims, now_ms()), &json!({ "claims": claims }))
}
