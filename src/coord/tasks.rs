//! Task store: creation with title dedup, listing, claiming, updates and
//! subtasks.

use super::Coordinator;
use crate::db::{Column, MemoryRow, NewMemory, Patch, Query, StoreResult, now_ms};
use crate::similarity::{extract_words, percent, similarity};
use crate::types::{
    AgentContext, ClaimRecord, EventKind, Priority, TASK_MESSAGE_TYPE, Task, TaskMeta, TaskRef,
    TaskStatus,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Input for `create_task`.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    /// Defaults to the parent's priority for subtasks, else normal.
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    /// Defaults to the parent's milestone for subtasks.
    pub milestone: Option<String>,
    pub parent_task: Option<String>,
}

/// One entry of a `create_subtasks` call.
#[derive(Debug, Clone, Default)]
pub struct NewSubtask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub milestone: Option<String>,
}

/// Filters for `list_tasks`. String filters are case-insensitive substrings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Any of these statuses. Empty means every status except done (unless
    /// `include_done`).
    pub statuses: Vec<TaskStatus>,
    pub assigned_to: Option<String>,
    pub milestone: Option<String>,
    pub include_done: bool,
}

/// Input for `update_task`. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    /// Appended, never replaces earlier notes.
    pub notes: Option<String>,
    pub blocked_reason: Option<String>,
    /// Empty string unassigns.
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CreateOutcome {
    Created {
        task: Task,
    },
    /// An active task already has this title, ignoring case.
    Duplicate {
        existing: TaskRef,
    },
    /// An active task's title is lexically close enough to count as the same work.
    Similar {
        existing: TaskRef,
        similarity: f64,
        percent: u32,
    },
    ParentNotFound {
        parent_task: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PickOutcome {
    Claimed {
        task: Task,
        claim: ClaimRecord,
    },
    NotFound {
        task_id: String,
    },
    /// The task is not open. Nothing was written.
    Unavailable {
        task: TaskRef,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated {
        task: Task,
        previous_status: TaskStatus,
        /// Set when a task linked to a milestone was just completed; the
        /// milestone itself is tracked elsewhere and is not touched.
        milestone_hint: Option<String>,
    },
    NotFound {
        task_id: String,
    },
    IllegalTransition {
        task: TaskRef,
        from: TaskStatus,
        to: TaskStatus,
    },
    /// The task's status changed between read and write.
    Conflict {
        task: TaskRef,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubtaskOutcome {
    Created { parent: TaskRef, subtasks: Vec<Task> },
    ParentNotFound { parent_task: String },
}

fn task_content(title: &str, description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!("TASK: {} - {}", title, d),
        _ => format!("TASK: {}", title),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Coordinator {
    fn task_query(&self, ctx: &AgentContext) -> Query {
        Query::new()
            .eq(Column::FoldId, ctx.fold_id.clone())
            .eq(Column::MessageType, TASK_MESSAGE_TYPE.to_string())
    }

    /// Most recent task rows of the fold, newest first. Rows whose metadata
    /// cannot be read as a task are skipped.
    pub(crate) fn recent_tasks(&self, ctx: &AgentContext) -> StoreResult<Vec<Task>> {
        let rows = self
            .store
            .select(&self.task_query(ctx).limit(self.settings.task_scan_limit))?;

        Ok(rows
            .iter()
            .filter_map(|row| match Task::from_row(row) {
                Ok((task, _)) => Some(task),
                Err(e) => {
                    warn!(task_id = %row.id, error = %e, "Skipping malformed task row");
                    None
                }
            })
            .collect())
    }

    fn load_task_row(&self, ctx: &AgentContext, task_id: &str) -> StoreResult<Option<MemoryRow>> {
        let rows = self
            .store
            .select(&self.task_query(ctx).eq(Column::Id, task_id.to_string()).limit(1))?;
        Ok(rows.into_iter().next())
    }

    /// Get a task by id.
    pub fn get_task(&self, ctx: &AgentContext, task_id: &str) -> StoreResult<Option<Task>> {
        match self.load_task_row(ctx, task_id)? {
            Some(row) => Ok(Some(Task::from_row(&row)?.0)),
            None => Ok(None),
        }
    }

    fn insert_task(&self, ctx: &AgentContext, meta: TaskMeta) -> StoreResult<Task> {
        let row = self.store.insert(NewMemory {
            fold_id: ctx.fold_id.clone(),
            agent: ctx.agent.clone(),
            session_id: Some(ctx.session_id.clone()),
            message_type: TASK_MESSAGE_TYPE.to_string(),
            content: Some(task_content(&meta.title, meta.description.as_deref())),
            metadata: meta.to_map()?,
            ts: now_ms(),
        })?;
        Ok(Task::from_row(&row)?.0)
    }

    fn new_task_meta(
        ctx: &AgentContext,
        title: String,
        description: Option<String>,
        priority: Priority,
        assigned_to: Option<String>,
        milestone: Option<String>,
        parent_task: Option<String>,
    ) -> TaskMeta {
        let claimed_at = assigned_to.as_ref().map(|_| Utc::now());
        TaskMeta {
            event: EventKind::Task.as_str().to_string(),
            status: if assigned_to.is_some() {
                TaskStatus::Claimed
            } else {
                TaskStatus::Open
            },
            title,
            description,
            priority,
            assigned_to,
            parent_task,
            milestone,
            created_by: Some(ctx.agent.clone()),
            claimed_at,
            ..Default::default()
        }
    }

    /// Create a task unless an active task with the same or a near-identical
    /// title exists among the most recent tasks of the fold.
    pub fn create_task(&self, ctx: &AgentContext, new: NewTask) -> StoreResult<CreateOutcome> {
        let wanted = new.title.to_lowercase();
        let wanted_words = extract_words(&new.title);

        for existing in self.recent_tasks(ctx)? {
            if !existing.status.is_active() {
                continue;
            }

            if existing.title.to_lowercase() == wanted {
                info!(fold = %ctx.fold_id, existing = %existing.id, "Rejected duplicate task title");
                return Ok(CreateOutcome::Duplicate {
                    existing: existing.summary(),
                });
            }

            let score = similarity(&wanted_words, &extract_words(&existing.title));
            if score >= self.settings.dedup_threshold {
                info!(
                    fold = %ctx.fold_id,
                    existing = %existing.id,
                    similarity = score,
                    "Rejected near-duplicate task title"
                );
                return Ok(CreateOutcome::Similar {
                    existing: existing.summary(),
                    similarity: score,
                    percent: percent(score),
                });
            }
        }

        let mut priority = new.priority;
        let mut milestone = non_empty(new.milestone);
        let parent_task = non_empty(new.parent_task);
        if let Some(ref parent_id) = parent_task {
            let Some(parent) = self.get_task(ctx, parent_id)? else {
                return Ok(CreateOutcome::ParentNotFound {
                    parent_task: parent_id.clone(),
                });
            };
            priority = priority.or(Some(parent.priority));
            milestone = milestone.or(parent.milestone);
        }

        let meta = Self::new_task_meta(
            ctx,
            new.title,
            non_empty(new.description),
            priority.unwrap_or_default(),
            non_empty(new.assigned_to),
            milestone,
            parent_task,
        );
        let task = self.insert_task(ctx, meta)?;

        info!(fold = %ctx.fold_id, task_id = %task.id, status = %task.status, "Task created");
        Ok(CreateOutcome::Created { task })
    }

    /// Tasks of the fold, most severe priority first, newest first within a
    /// priority.
    pub fn list_tasks(&self, ctx: &AgentContext, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let assignee = filter.assigned_to.as_ref().map(|a| a.to_lowercase());
        let milestone = filter.milestone.as_ref().map(|m| m.to_lowercase());

        let mut tasks: Vec<Task> = self
            .recent_tasks(ctx)?
            .into_iter()
            .filter(|t| {
                if filter.statuses.is_empty() {
                    filter.include_done || t.status != TaskStatus::Done
                } else {
                    filter.statuses.contains(&t.status)
                }
            })
            .filter(|t| match assignee {
                Some(ref a) => t
                    .assigned_to
                    .as_ref()
                    .is_some_and(|x| x.to_lowercase().contains(a.as_str())),
                None => true,
            })
            .filter(|t| match milestone {
                Some(ref m) => t
                    .milestone
                    .as_ref()
                    .is_some_and(|x| x.to_lowercase().contains(m.as_str())),
                None => true,
            })
            .collect();

        tasks.sort_by(|a, b| a.priority.cmp(&b.priority).then(b.seq.cmp(&a.seq)));
        Ok(tasks)
    }

    /// Claim an open task for the caller and record a companion claim.
    ///
    /// The status write is conditional on the task still being open, so two
    /// agents racing for the same task cannot both win.
    pub fn pick_task(&self, ctx: &AgentContext, task_id: &str) -> StoreResult<PickOutcome> {
        let Some(mut row) = self.load_task_row(ctx, task_id)? else {
            return Ok(PickOutcome::NotFound {
                task_id: task_id.to_string(),
            });
        };
        let (task, meta) = Task::from_row(&row)?;

        if task.status != TaskStatus::Open {
            debug!(task_id = %task.id, status = %task.status, "Pick refused, task not open");
            return Ok(PickOutcome::Unavailable {
                task: task.summary(),
            });
        }

        let mut next = meta;
        next.status = TaskStatus::Claimed;
        next.assigned_to = Some(ctx.agent.clone());
        next.claimed_at = Some(Utc::now());
        let next_map = next.to_map()?;

        let still_open = self
            .task_query(ctx)
            .eq(Column::Id, task.id.clone())
            .eq(Column::Meta("status"), TaskStatus::Open.as_str().to_string());
        let updated = self
            .store
            .update(&still_open, &Patch::metadata(next_map.clone()))?;

        if updated == 0 {
            info!(task_id = %task.id, agent = %ctx.agent, "Lost race for task");
            return Ok(match self.get_task(ctx, &task.id)? {
                Some(current) => PickOutcome::Unavailable {
                    task: current.summary(),
                },
                None => PickOutcome::NotFound {
                    task_id: task.id.clone(),
                },
            });
        }

        row.metadata = next_map;
        let (claimed, _) = Task::from_row(&row)?;
        let claim = self.record_claim(ctx, &claimed.title, &[], Some(&claimed.id))?;

        info!(fold = %ctx.fold_id, task_id = %claimed.id, agent = %ctx.agent, "Task claimed");
        Ok(PickOutcome::Claimed {
            task: claimed,
            claim,
        })
    }

    /// Apply a status move, note, blocked reason or reassignment.
    pub fn update_task(
        &self,
        ctx: &AgentContext,
        task_id: &str,
        update: TaskUpdate,
    ) -> StoreResult<UpdateOutcome> {
        let Some(mut row) = self.load_task_row(ctx, task_id)? else {
            return Ok(UpdateOutcome::NotFound {
                task_id: task_id.to_string(),
            });
        };
        let (task, meta) = Task::from_row(&row)?;
        let previous = task.status;

        if let Some(to) = update.status {
            if !previous.can_transition_to(to) {
                return Ok(UpdateOutcome::IllegalTransition {
                    task: task.summary(),
                    from: previous,
                    to,
                });
            }
        }
        if previous == TaskStatus::Done && update.assigned_to.is_some() {
            return Ok(UpdateOutcome::IllegalTransition {
                task: task.summary(),
                from: previous,
                to: previous,
            });
        }

        let now = Utc::now();
        let mut next = meta.clone();

        if let Some(status) = update.status {
            next.status = status;
            if previous == TaskStatus::Blocked && status != TaskStatus::Blocked {
                next.blocked_reason = None;
            }
        }
        if let Some(ref note) = update.notes {
            if !note.trim().is_empty() {
                next.append_note(note, now);
            }
        }
        if let Some(reason) = non_empty(update.blocked_reason) {
            next.blocked_reason = Some(reason);
        }
        if let Some(assignee) = update.assigned_to {
            next.assigned_to = non_empty(Some(assignee));
        }
        match update.status {
            Some(TaskStatus::Done) => next.completed_at = Some(now),
            Some(TaskStatus::Claimed | TaskStatus::InProgress) if meta.claimed_at.is_none() => {
                next.claimed_at = Some(now);
                if next.assigned_to.is_none() {
                    next.assigned_to = Some(ctx.agent.clone());
                }
            }
            _ => {}
        }

        let next_map = next.to_map()?;
        let unchanged = self
            .task_query(ctx)
            .eq(Column::Id, task.id.clone())
            .eq(Column::Meta("status"), previous.as_str().to_string());
        if self.store.update(&unchanged, &Patch::metadata(next_map.clone()))? == 0 {
            warn!(task_id = %task.id, "Task changed underneath update");
            let current = self.get_task(ctx, &task.id)?;
            return Ok(UpdateOutcome::Conflict {
                task: current.map(|t| t.summary()).unwrap_or_else(|| task.summary()),
            });
        }

        row.metadata = next_map;
        let (updated, _) = Task::from_row(&row)?;
        let milestone_hint = match update.status {
            Some(TaskStatus::Done) => updated.milestone.clone(),
            _ => None,
        };

        info!(
            fold = %ctx.fold_id,
            task_id = %updated.id,
            from = %previous,
            to = %updated.status,
            "Task updated"
        );
        Ok(UpdateOutcome::Updated {
            task: updated,
            previous_status: previous,
            milestone_hint,
        })
    }

    /// Create children of an existing task. Children inherit the parent's
    /// priority and milestone unless given, and skip title dedup.
    pub fn create_subtasks(
        &self,
        ctx: &AgentContext,
        parent_id: &str,
        subtasks: Vec<NewSubtask>,
    ) -> StoreResult<SubtaskOutcome> {
        let Some(parent) = self.get_task(ctx, parent_id)? else {
            return Ok(SubtaskOutcome::ParentNotFound {
                parent_task: parent_id.to_string(),
            });
        };

        let mut created = Vec::with_capacity(subtasks.len());
        for sub in subtasks {
            let meta = Self::new_task_meta(
                ctx,
                sub.title,
                non_empty(sub.description),
                sub.priority.unwrap_or(parent.priority),
                non_empty(sub.assigned_to),
                non_empty(sub.milestone).or_else(|| parent.milestone.clone()),
                Some(parent.id.clone()),
            );
            created.push(self.insert_task(ctx, meta)?);
        }

        info!(
            fold = %ctx.fold_id,
            parent = %parent.id,
            count = created.len(),
            "Subtasks created"
        );
        Ok(SubtaskOutcome::Created {
            parent: parent.summary(),
            subtasks: created,
        })
    }
}
