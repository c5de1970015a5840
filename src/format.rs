//! Plain-text rendering of coordination outcomes for tool results and the CLI.

use crate::coord::{
    Availability, ClaimOutcome, CreateOutcome, PickOutcome, SubtaskOutcome, UpdateOutcome,
};
use crate::similarity::short_agent_name;
use crate::types::{ActiveClaim, EventKind, Task, TaskRef, TaskStatus};
use heck::ToTitleCase;

const DESCRIPTION_PREVIEW: usize = 200;
const NOTES_PREVIEW: usize = 150;

/// Truncate to at most `max` characters.
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((cut, _)) => &id[..cut],
        None => id,
    }
}

/// "open", or "claimed by quiet-oak".
fn status_with_holder(task: &TaskRef) -> String {
    match task.assigned_to {
        Some(ref holder) if task.status.is_held() => {
            format!("{} by {}", task.status, short_agent_name(holder))
        }
        _ => task.status.to_string(),
    }
}

pub fn format_create(outcome: &CreateOutcome) -> String {
    match outcome {
        CreateOutcome::Created { task } => {
            let mut lines = vec![
                format!("Task created (ID: {}).", task.id),
                format!("Title: {}", task.title),
                format!("Priority: {}", task.priority),
            ];
            if let Some(ref a) = task.assigned_to {
                lines.push(format!("Assigned to: {}", a));
            }
            if let Some(ref m) = task.milestone {
                lines.push(format!("Milestone: {}", m));
            }
            if let Some(ref p) = task.parent_task {
                lines.push(format!("Parent: {}", p));
            }
            lines.join("\n")
        }
        CreateOutcome::Duplicate { existing } => format!(
            "Duplicate: active task already exists with title \"{}\" (ID: {}, status: {}).",
            existing.title, existing.id, existing.status
        ),
        CreateOutcome::Similar {
            existing, percent, ..
        } => format!(
            "Similar task exists ({}% match): \"{}\" (ID: {}, status: {}). Use that task or make your title more distinct.",
            percent, existing.title, existing.id, existing.status
        ),
        CreateOutcome::ParentNotFound { parent_task } => {
            format!("Parent task not found: {}", parent_task)
        }
    }
}

/// One task as a header line plus indented details.
fn task_lines(task: &Task) -> Vec<String> {
    let assignee = task
        .assigned_to
        .as_ref()
        .map(|a| format!(" -> {}", a))
        .unwrap_or_default();
    let milestone = task
        .milestone
        .as_ref()
        .map(|m| format!(" [{}]", m))
        .unwrap_or_default();
    let parent = task
        .parent_task
        .as_ref()
        .map(|p| format!(" (subtask of {})", short_id(p)))
        .unwrap_or_default();
    let blocked = task
        .blocked_reason
        .as_ref()
        .map(|b| format!(" BLOCKED: {}", b))
        .unwrap_or_default();

    let mut lines = vec![
        format!(
            "[{}] {} | {}{}{}{}{}",
            task.priority.as_str().to_uppercase(),
            task.status,
            task.title,
            assignee,
            milestone,
            parent,
            blocked
        ),
        format!("  ID: {}", task.id),
    ];
    if let Some(ref d) = task.description {
        lines.push(format!("  {}", preview(d, DESCRIPTION_PREVIEW)));
    }
    if let Some(ref n) = task.notes {
        lines.push(format!("  Notes: {}", preview(n, NOTES_PREVIEW)));
    }
    lines
}

pub fn format_tasks(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks match the filters.".to_string();
    }
    let mut lines = vec![format!("{} task(s):\n", tasks.len())];
    for task in tasks {
        lines.extend(task_lines(task));
    }
    lines.join("\n")
}

pub fn format_pick(outcome: &PickOutcome) -> String {
    match outcome {
        PickOutcome::Claimed { task, .. } => format!(
            "Claimed task: {}\nID: {}\nStatus: {}\n\nStart working and call update_task with status=in_progress when you begin.",
            task.title, task.id, task.status
        ),
        PickOutcome::NotFound { task_id } => format!("Task not found: {}", task_id),
        PickOutcome::Unavailable { task } => format!(
            "Task is already {}. Pick an open task instead.",
            status_with_holder(task)
        ),
    }
}

pub fn format_update(outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::Updated {
            task,
            previous_status,
            milestone_hint,
        } => {
            let mut lines = vec![format!("Updated task: {}", task.title)];
            if task.status == *previous_status {
                lines.push(format!("Status: {}", task.status));
            } else {
                lines.push(format!(
                    "Status: {} -> {}",
                    previous_status.as_str().to_title_case(),
                    task.status.as_str().to_title_case()
                ));
            }
            if let Some(ref a) = task.assigned_to {
                lines.push(format!("Assigned to: {}", a));
            }
            if let Some(ref b) = task.blocked_reason {
                lines.push(format!("Blocked: {}", b));
            }
            if let Some(last) = task.notes.as_deref().and_then(|n| n.lines().last()) {
                lines.push(format!("Latest note: {}", last));
            }
            if let Some(m) = milestone_hint {
                lines.push(format!(
                    "\nThis task was linked to milestone \"{}\". Consider updating the milestone's progress.",
                    m
                ));
            }
            lines.join("\n")
        }
        UpdateOutcome::NotFound { task_id } => format!("Task not found: {}", task_id),
        UpdateOutcome::IllegalTransition { task, from, to } => {
            if *from == TaskStatus::Done {
                format!(
                    "Task \"{}\" is done and can no longer be changed (requested: {}).",
                    task.title, to
                )
            } else {
                format!(
                    "Cannot move task \"{}\" from {} to {}.",
                    task.title, from, to
                )
            }
        }
        UpdateOutcome::Conflict { task } => format!(
            "Task \"{}\" changed while updating (now {}). Re-read it and try again.",
            task.title,
            status_with_holder(task)
        ),
    }
}

pub fn format_subtasks(outcome: &SubtaskOutcome) -> String {
    match outcome {
        SubtaskOutcome::Created { parent, subtasks } => {
            let mut lines = vec![format!(
                "Created {} subtask(s) under \"{}\":",
                subtasks.len(),
                parent.title
            )];
            lines.extend(
                subtasks
                    .iter()
                    .map(|t| format!("  {} (ID: {})", t.title, t.id)),
            );
            lines.join("\n")
        }
        SubtaskOutcome::ParentNotFound { parent_task } => {
            format!("Parent task not found: {}", parent_task)
        }
    }
}

pub fn format_available(availability: &Availability) -> String {
    if availability.tasks.is_empty() {
        return "No open tasks match filters.".to_string();
    }

    let mut lines = vec![
        format!(
            "{} uncontested, {} contested:\n",
            availability.uncontested, availability.contested
        ),
        format!("{} open task(s):\n", availability.tasks.len()),
    ];
    for entry in &availability.tasks {
        let task = &entry.task;
        let milestone = task
            .milestone
            .as_ref()
            .map(|m| format!(" [{}]", m))
            .unwrap_or_default();
        lines.push(format!(
            "  [{}] {}{}",
            task.priority.as_str().to_uppercase(),
            task.title,
            milestone
        ));
        if let Some(ref c) = entry.contention {
            lines.push(format!(
                "    CONTESTED: {} working on similar scope ({}% overlap)",
                c.short_name, c.percent
            ));
        }
        lines.push(format!("    ID: {}", task.id));
    }
    lines.join("\n")
}

pub fn format_claim(scope: &str, files: &[String], outcome: &ClaimOutcome) -> String {
    match outcome {
        ClaimOutcome::Locked { files: locked } => {
            let noun = if locked.len() == 1 { "File" } else { "Files" };
            let mut lines = vec![format!("SCOPE LOCKED: {} already at max claimants:", noun)];
            for l in locked {
                let names: Vec<&str> = l.holders.iter().map(|h| short_agent_name(h)).collect();
                lines.push(format!("  - {} (claimed by {})", l.file, names.join(", ")));
            }
            lines.push("\nPick different files or wait for a claim to release.".to_string());
            lines.join("\n")
        }
        ClaimOutcome::Recorded {
            conflicts, others, ..
        } => {
            let mut lines = vec![format!("Claimed: {}", scope)];
            if !files.is_empty() {
                lines.push(format!("Files: {}", files.join(", ")));
            }
            if !conflicts.is_empty() {
                lines.push(String::new());
                lines.push("=== CONFLICTS DETECTED ===".to_string());
                for c in conflicts {
                    let mut reasons = Vec::new();
                    if c.scope_overlap {
                        reasons.push(format!("scope overlap {}%", c.percent));
                    }
                    if !c.shared_files.is_empty() {
                        reasons.push(format!("shared files: {}", c.shared_files.join(", ")));
                    }
                    lines.push(format!(
                        "CONFLICT: {} is already working on \"{}\" ({}). Coordinate or pick a different task.",
                        c.short_name,
                        c.scope,
                        reasons.join("; ")
                    ));
                }
                lines.push(String::new());
                lines.push("Consider coordinating with these agents or picking different work.".to_string());
            } else if !others.is_empty() {
                lines.push(String::new());
                lines.push("Other active claims:".to_string());
                for c in others {
                    lines.push(format!("  {}: {}", short_agent_name(&c.agent), c.scope));
                }
            }
            lines.join("\n")
        }
    }
}

/// Observer view of live claims. `now_ms` is used for ages.
pub fn format_claims(claims: &[ActiveClaim], now_ms: i64) -> String {
    if claims.is_empty() {
        return "No active claims.".to_string();
    }
    let mut lines = vec![format!("{} active claim(s):\n", claims.len())];
    for c in claims {
        let minutes = (now_ms - c.created_at).max(0) / 60_000;
        lines.push(format!(
            "  {}: {} ({}m ago)",
            short_agent_name(&c.agent),
            c.scope,
            minutes
        ));
        if !c.files.is_empty() {
            lines.push(format!("    Files: {}", c.files.join(", ")));
        }
        if let Some(ref t) = c.task_id {
            lines.push(format!("    Task: {}", t));
        }
    }
    lines.join("\n")
}

pub fn format_session_end(kind: EventKind, summary: Option<&str>) -> String {
    let mut text = match kind {
        EventKind::SessionDone => "Session marked done. Claims released.".to_string(),
        _ => "Session ended. Claims released.".to_string(),
    };
    if let Some(s) = summary.filter(|s| !s.is_empty()) {
        text.push_str(&format!("\nSummary: {}", s));
    }
    text
}
