//! Availability planner: which open tasks look free to pick up.

use super::Coordinator;
use crate::db::StoreResult;
use crate::similarity::{extract_words, percent, short_agent_name, similarity};
use crate::types::{ActiveClaim, AgentContext, Priority, Task, TaskStatus};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct AvailableFilter {
    /// Only tasks at least this severe.
    pub priority: Option<Priority>,
    /// Case-insensitive substring of the task's milestone.
    pub milestone: Option<String>,
}

/// The live claim that makes a task look taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contention {
    pub agent: String,
    pub short_name: String,
    pub scope: String,
    pub similarity: f64,
    pub percent: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableTask {
    #[serde(flatten)]
    pub task: Task,
    pub contention: Option<Contention>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    /// Uncontested first, then by priority; recency order within ties.
    pub tasks: Vec<AvailableTask>,
    pub uncontested: usize,
    pub contested: usize,
    /// Other agents' live claims the tasks were scored against.
    pub claims: Vec<ActiveClaim>,
}

impl Coordinator {
    /// Open tasks scored against other agents' live claims.
    ///
    /// A task is contested by the first claim, newest first, whose scope
    /// shares enough words with the task's title and description. The
    /// caller's own claims never contest anything.
    pub fn list_available(
        &self,
        ctx: &AgentContext,
        filter: &AvailableFilter,
    ) -> StoreResult<Availability> {
        let milestone = filter.milestone.as_ref().map(|m| m.to_lowercase());

        let open: Vec<Task> = self
            .recent_tasks(ctx)?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Open)
            .filter(|t| filter.priority.is_none_or(|floor| t.priority.at_or_above(floor)))
            .filter(|t| match milestone {
                Some(ref m) => t
                    .milestone
                    .as_ref()
                    .is_some_and(|x| x.to_lowercase().contains(m.as_str())),
                None => true,
            })
            .collect();

        let claims = self.active_claims(ctx, Some(&ctx.agent))?;
        let claim_words: Vec<HashSet<String>> =
            claims.iter().map(|c| extract_words(&c.scope)).collect();

        let mut tasks: Vec<AvailableTask> = open
            .into_iter()
            .map(|task| {
                let words = extract_words(&task.scope_text());
                let contention = claims.iter().zip(&claim_words).find_map(|(claim, scope)| {
                    let score = similarity(&words, scope);
                    (score >= self.settings.contention_threshold).then(|| Contention {
                        agent: claim.agent.clone(),
                        short_name: short_agent_name(&claim.agent).to_string(),
                        scope: claim.scope.clone(),
                        similarity: score,
                        percent: percent(score),
                    })
                });
                AvailableTask { task, contention }
            })
            .collect();

        tasks.sort_by(|a, b| {
            a.contention
                .is_some()
                .cmp(&b.contention.is_some())
                .then(a.task.priority.cmp(&b.task.priority))
        });

        let contested = tasks.iter().filter(|t| t.contention.is_some()).count();
        let uncontested = tasks.len() - contested;
        debug!(
            fold = %ctx.fold_id,
            uncontested,
            contested,
            claims = claims.len(),
            "Availability computed"
        );

        Ok(Availability {
            tasks,
            uncontested,
            contested,
            claims,
        })
    }
}
