//! Task tools: create, list, pick, update, subtasks and availability.

use super::{
    ToolContext, ToolOutput, get_bool, get_parsed, get_string, get_string_array, make_tool,
    require_string,
};
use crate::coord::{
    AvailableFilter, Coordinator, CreateOutcome, NewSubtask, NewTask, PickOutcome, TaskFilter,
    TaskUpdate, UpdateOutcome,
};
use crate::error::ToolError;
use crate::format::{
    format_available, format_create, format_pick, format_subtasks, format_tasks, format_update,
};
use crate::types::{AgentContext, TaskStatus};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

const PRIORITIES: [&str; 4] = ["urgent", "high", "normal", "low"];

pub fn get_tools() -> Vec<Tool> {
    let statuses: Vec<&str> = TaskStatus::ALL.iter().map(|s| s.as_str()).collect();

    vec![
        make_tool(
            "create_task",
            "Create a task in this fold. Rejected if an active task already has the same or a very similar title; the existing task is returned instead.",
            json!({
                "title": { "type": "string", "description": "Short task title" },
                "description": { "type": "string", "description": "What needs doing" },
                "priority": {
                    "type": "string",
                    "enum": PRIORITIES,
                    "description": "Task priority (default: normal, or the parent's)"
                },
                "assigned_to": {
                    "type": "string",
                    "description": "Agent to assign; the task starts claimed"
                },
                "milestone": { "type": "string", "description": "Milestone this task serves" },
                "parent_task": { "type": "string", "description": "Parent task ID" }
            }),
            vec!["title"],
        ),
        make_tool(
            "list_tasks",
            "List tasks in this fold, most urgent first. Done tasks are hidden unless requested.",
            json!({
                "status": {
                    "oneOf": [
                        { "type": "string", "enum": statuses },
                        { "type": "array", "items": { "type": "string", "enum": statuses } }
                    ],
                    "description": "Only these statuses"
                },
                "assigned_to": { "type": "string", "description": "Assignee contains this text" },
                "milestone": { "type": "string", "description": "Milestone contains this text" },
                "include_done": { "type": "boolean", "description": "Include done tasks" }
            }),
            vec![],
        ),
        make_tool(
            "pick_task",
            "Claim an open task for yourself. Fails without changes if the task is no longer open.",
            json!({
                "task_id": { "type": "string", "description": "Task ID" }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "update_task",
            "Update a task: move its status (open -> claimed -> in_progress -> done, in_progress <-> blocked), add a note, set a blocked reason or reassign it.",
            json!({
                "task_id": { "type": "string", "description": "Task ID" },
                "status": { "type": "string", "enum": statuses, "description": "New status" },
                "notes": { "type": "string", "description": "Progress note, appended with a timestamp" },
                "blocked_reason": { "type": "string", "description": "Why the task is blocked" },
                "assigned_to": { "type": "string", "description": "New assignee; empty to unassign" }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "create_subtasks",
            "Break a task into subtasks. Subtasks inherit the parent's priority and milestone unless given.",
            json!({
                "parent_task": { "type": "string", "description": "Parent task ID" },
                "subtasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "description": { "type": "string" },
                            "priority": { "type": "string", "enum": PRIORITIES },
                            "assigned_to": { "type": "string" },
                            "milestone": { "type": "string" }
                        },
                        "required": ["title"]
                    },
                    "description": "Subtasks to create"
                }
            }),
            vec!["parent_task", "subtasks"],
        ),
        make_tool(
            "list_available",
            "Open tasks nobody else seems to be working on first. Tasks overlapping another agent's active claim are marked contested.",
            json!({
                "priority": {
                    "type": "string",
                    "enum": PRIORITIES,
                    "description": "Only tasks at least this urgent"
                },
                "milestone": { "type": "string", "description": "Milestone contains this text" }
            }),
            vec![],
        ),
    ]
}

pub fn create_task(
    coord: &Coordinator,
    agent: &AgentContext,
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolOutput> {
    let new = NewTask {
        title: require_string(&args, "title")?,
        description: get_string(&args, "description"),
        priority: get_parsed(&args, "priority")?,
        assigned_to: get_string(&args, "assigned_to"),
        milestone: get_string(&args, "milestone"),
        parent_task: get_string(&args, "parent_task"),
    };

    let outcome = coord.create_task(agent, new)?;
    if let CreateOutcome::Similar { ref existing, percent, .. } = outcome {
        ctx.logger.info(&format!(
            "Near-duplicate of {} ({}% match), not created",
            existing.id, percent
        ));
    }
    ToolOutput::new(format_create(&outcome), &outcome)
}

pub fn list_tasks(coord: &Coordinator, agent: &AgentContext, args: Value) -> Result<ToolOutput> {
    let statuses = match get_string_array(&args, "status") {
        Some(raw) => raw
            .iter()
            .map(|s| s.parse::<TaskStatus>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ToolError::invalid_value("status", e))?,
        None => Vec::new(),
    };
    let filter = TaskFilter {
        statuses,
        assigned_to: get_string(&args, "assigned_to"),
        milestone: get_string(&args, "milestone"),
        include_done: get_bool(&args, "include_done").unwrap_or(false),
    };

    let tasks = coord.list_tasks(agent, &filter)?;
    ToolOutput::new(format_tasks(&tasks), &json!({ "tasks": tasks }))
}

pub fn pick_task(
    coord: &Coordinator,
    agent: &AgentContext,
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolOutput> {
    let task_id = require_string(&args, "task_id")?;

    let outcome = coord.pick_task(agent, &task_id)?;
    if let PickOutcome::Claimed { ref task, .. } = outcome {
        ctx.logger.info(&format!("{} picked task {}", agent.agent, task.id));
    }
    ToolOutput::new(format_pick(&outcome), &outcome)
}

pub fn update_task(
    coord: &Coordinator,
    agent: &AgentContext,
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolOutput> {
    let task_id = require_string(&args, "task_id")?;
    let update = TaskUpdate {
        status: get_parsed(&args, "status")?,
        notes: get_string(&args, "notes"),
        blocked_reason: get_string(&args, "blocked_reason"),
        // empty string is meaningful here: unassign
        assigned_to: args
            .get("assigned_to")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string()),
    };

    let outcome = coord.update_task(agent, &task_id, update)?;
    if let UpdateOutcome::Conflict { ref task } = outcome {
        ctx.logger
            .warning(&format!("Task {} changed underneath update", task.id));
    }
    ToolOutput::new(format_update(&outcome), &outcome)
}

pub fn create_subtasks(
    coord: &Coordinator,
    agent: &AgentContext,
    args: Value,
) -> Result<ToolOutput> {
    let parent_id = require_string(&args, "parent_task")?;
    let entries = args
        .get("subtasks")
        .and_then(|v| v.as_array())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ToolError::missing_field("subtasks"))?;

    let mut subtasks = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let title = get_string(entry, "title").ok_or_else(|| {
            ToolError::invalid_value("subtasks", format!("subtask {} has no title", i + 1))
        })?;
        subtasks.push(NewSubtask {
            title,
            description: get_string(entry, "description"),
            priority: get_parsed(entry, "priority")?,
            assigned_to: get_string(entry, "assigned_to"),
            milestone: get_string(entry, "milestone"),
        });
    }

    let outcome = coord.create_subtasks(agent, &parent_id, subtasks)?;
    ToolOutput::new(format_subtasks(&outcome), &outcome)
}

pub fn list_available(
    coord: &Coordinator,
    agent: &AgentContext,
    args: Value,
) -> Result<ToolOutput> {
    let filter = AvailableFilter {
        priority: get_parsed(&args, "priority")?,
        milestone: get_string(&args, "milestone"),
    };

    let availability = coord.list_available(agent, &filter)?;
    ToolOutput::new(format_available(&availability), &availability)
}
