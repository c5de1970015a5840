//! Integration tests for the coordination engine.
//!
//! Every test runs against a fresh in-memory SQLite store. Agents are plain
//! `AgentContext` values sharing one `Coordinator`, the same way several MCP
//! server processes share one database file.

use fold_coord::config::CoordinationConfig;
use fold_coord::coord::{
    AvailableFilter, ClaimOutcome, Coordinator, CreateOutcome, NewSubtask, NewTask, PickOutcome,
    SubtaskOutcome, TaskFilter, TaskUpdate, UpdateOutcome,
};
use fold_coord::db::{Column, Database, NewMemory, Patch, Query, RecordStore, now_ms};
use fold_coord::types::{AgentContext, Priority, SessionOutcome, Task, TaskStatus};
use serde_json::json;
use std::sync::Arc;

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn setup() -> Coordinator {
    setup_with(CoordinationConfig::default())
}

fn setup_with(settings: CoordinationConfig) -> Coordinator {
    Coordinator::new(Arc::new(setup_db()), settings)
}

fn agent(name: &str) -> AgentContext {
    AgentContext::new("fold", format!("team/{}", name), "team", format!("{}-s1", name))
}

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        ..Default::default()
    }
}

fn create(coord: &Coordinator, ctx: &AgentContext, task: NewTask) -> Task {
    match coord.create_task(ctx, task).expect("create_task failed") {
        CreateOutcome::Created { task } => task,
        other => panic!("expected Created, got {:?}", other),
    }
}

mod dedup_tests {
    use super::*;

    #[test]
    fn exact_title_is_rejected_case_insensitively() {
        let coord = setup();
        let alpha = agent("alpha");
        let first = create(&coord, &alpha, new_task("Fix login bug"));

        match coord.create_task(&alpha, new_task("fix login bug")).unwrap() {
            CreateOutcome::Duplicate { existing } => assert_eq!(existing.id, first.id),
            other => panic!("expected Duplicate, got {:?}", other),
        }
    }

    #[test]
    fn fuzzy_match_at_threshold_is_rejected() {
        let coord = setup();
        let alpha = agent("alpha");
        let first = create(&coord, &alpha, new_task("login redirect loop"));

        // {login, redirect, loop} vs {login, redirect, broken}: 2/4
        match coord
            .create_task(&agent("beta"), new_task("login redirect broken"))
            .unwrap()
        {
            CreateOutcome::Similar {
                existing, percent, ..
            } => {
                assert_eq!(existing.id, first.id);
                assert_eq!(percent, 50);
            }
            other => panic!("expected Similar, got {:?}", other),
        }
    }

    #[test]
    fn below_threshold_creates_distinct_tasks() {
        let coord = setup();
        let alpha = agent("alpha");
        let a = create(&coord, &alpha, new_task("Refactor database layer"));
        let b = create(&coord, &alpha, new_task("Refactor billing export"));
        assert_ne!(a.id, b.id);
        assert_eq!(b.status, TaskStatus::Open);
    }

    #[test]
    fn done_tasks_do_not_block_new_ones() {
        let coord = setup();
        let alpha = agent("alpha");
        let first = create(&coord, &alpha, new_task("Ship release notes"));
        coord.pick_task(&alpha, &first.id).unwrap();
        for status in [TaskStatus::InProgress, TaskStatus::Done] {
            let update = TaskUpdate {
                status: Some(status),
                ..Default::default()
            };
            assert!(matches!(
                coord.update_task(&alpha, &first.id, update).unwrap(),
                UpdateOutcome::Updated { .. }
            ));
        }

        let again = create(&coord, &alpha, new_task("Ship release notes"));
        assert_ne!(again.id, first.id);
    }

    #[test]
    fn folds_are_isolated() {
        let coord = setup();
        create(&coord, &agent("alpha"), new_task("Fix login bug"));

        let elsewhere = AgentContext::new("other-fold", "team/beta", "team", "beta-s1");
        let task = create(&coord, &elsewhere, new_task("Fix login bug"));
        assert_eq!(task.status, TaskStatus::Open);

        assert_eq!(
            coord
                .list_tasks(&agent("alpha"), &TaskFilter::default())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn assigned_task_starts_claimed() {
        let coord = setup();
        let task = create(
            &coord,
            &agent("alpha"),
            NewTask {
                title: "Write onboarding guide".to_string(),
                assigned_to: Some("team/beta".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(task.status, TaskStatus::Claimed);
        assert_eq!(task.assigned_to.as_deref(), Some("team/beta"));
        assert!(task.claimed_at.is_some());
    }

    #[test]
    fn child_inherits_parent_priority_and_milestone() {
        let coord = setup();
        let alpha = agent("alpha");
        let parent = create(
            &coord,
            &alpha,
            NewTask {
                title: "Payments revamp".to_string(),
                priority: Some(Priority::High),
                milestone: Some("q3-launch".to_string()),
                ..Default::default()
            },
        );

        let child = create(
            &coord,
            &alpha,
            NewTask {
                title: "Stripe webhook handler".to_string(),
                parent_task: Some(parent.id.clone()),
                ..Default::default()
            },
        );
        assert_eq!(child.priority, Priority::High);
        assert_eq!(child.milestone.as_deref(), Some("q3-launch"));
        assert_eq!(child.parent_task.as_deref(), Some(parent.id.as_str()));

        let missing = coord
            .create_task(
                &alpha,
                NewTask {
                    title: "Orphan".to_string(),
                    parent_task: Some("no-such-task".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(missing, CreateOutcome::ParentNotFound { .. }));
    }

    #[test]
    fn subtasks_skip_dedup_and_inherit() {
        let coord = setup();
        let alpha = agent("alpha");
        let parent = create(
            &coord,
            &alpha,
            NewTask {
                title: "Search overhaul".to_string(),
                priority: Some(Priority::Urgent),
                ..Default::default()
            },
        );

        let subs = vec![
            NewSubtask {
                title: "Search overhaul".to_string(),
                ..Default::default()
            },
            NewSubtask {
                title: "Index rebuild".to_string(),
                priority: Some(Priority::Low),
                assigned_to: Some("team/beta".to_string()),
                ..Default::default()
            },
        ];
        match coord.create_subtasks(&alpha, &parent.id, subs).unwrap() {
            SubtaskOutcome::Created { parent: p, subtasks } => {
                assert_eq!(p.id, parent.id);
                assert_eq!(subtasks.len(), 2);
                assert_eq!(subtasks[0].priority, Priority::Urgent);
                assert_eq!(subtasks[1].priority, Priority::Low);
                assert_eq!(subtasks[1].status, TaskStatus::Claimed);
                assert!(
                    subtasks
                        .iter()
                        .all(|t| t.parent_task.as_deref() == Some(parent.id.as_str()))
                );
            }
            other => panic!("expected Created, got {:?}", other),
        }

        assert!(matches!(
            coord.create_subtasks(&alpha, "missing", vec![]).unwrap(),
            SubtaskOutcome::ParentNotFound { .. }
        ));
    }
}

mod transition_tests {
    use super::*;

    fn set_status(coord: &Coordinator, ctx: &AgentContext, id: &str, status: TaskStatus) -> UpdateOutcome {
        coord
            .update_task(
                ctx,
                id,
                TaskUpdate {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn pick_open_task_claims_it_and_records_claim() {
        let coord = setup();
        let alpha = agent("alpha");
        let beta = agent("beta");
        let task = create(&coord, &alpha, new_task("Migrate auth to JWT"));

        match coord.pick_task(&beta, &task.id).unwrap() {
            PickOutcome::Claimed { task: picked, claim } => {
                assert_eq!(picked.status, TaskStatus::Claimed);
                assert_eq!(picked.assigned_to.as_deref(), Some("team/beta"));
                assert!(picked.claimed_at.is_some());
                assert_eq!(claim.scope, "Migrate auth to JWT");
                assert_eq!(claim.task_id.as_deref(), Some(task.id.as_str()));
                assert_eq!(claim.session_id.as_deref(), Some("beta-s1"));
            }
            other => panic!("expected Claimed, got {:?}", other),
        }

        let stored = coord.get_task(&alpha, &task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Claimed);
    }

    #[test]
    fn pick_non_open_task_reports_status_without_mutation() {
        let coord = setup();
        let alpha = agent("alpha");
        let beta = agent("beta");

        let claimed = create(&coord, &alpha, new_task("Rotate TLS certificates"));
        coord.pick_task(&alpha, &claimed.id).unwrap();

        let in_progress = create(&coord, &alpha, new_task("Profile query planner"));
        coord.pick_task(&alpha, &in_progress.id).unwrap();
        set_status(&coord, &alpha, &in_progress.id, TaskStatus::InProgress);

        let blocked = create(&coord, &alpha, new_task("Vendor patched openssl"));
        coord.pick_task(&alpha, &blocked.id).unwrap();
        set_status(&coord, &alpha, &blocked.id, TaskStatus::Blocked);

        let done = create(&coord, &alpha, new_task("Archive legacy dashboards"));
        coord.pick_task(&alpha, &done.id).unwrap();
        set_status(&coord, &alpha, &done.id, TaskStatus::InProgress);
        set_status(&coord, &alpha, &done.id, TaskStatus::Done);

        for (id, expected) in [
            (&claimed.id, TaskStatus::Claimed),
            (&in_progress.id, TaskStatus::InProgress),
            (&blocked.id, TaskStatus::Blocked),
            (&done.id, TaskStatus::Done),
        ] {
            let before = coord.get_task(&alpha, id).unwrap().unwrap();
            match coord.pick_task(&beta, id).unwrap() {
                PickOutcome::Unavailable { task } => {
                    assert_eq!(task.status, expected);
                    assert_eq!(task.assigned_to.as_deref(), Some("team/alpha"));
                }
                other => panic!("expected Unavailable, got {:?}", other),
            }
            let after = coord.get_task(&alpha, id).unwrap().unwrap();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn pick_missing_task_is_not_found() {
        let coord = setup();
        assert!(matches!(
            coord.pick_task(&agent("alpha"), "nope").unwrap(),
            PickOutcome::NotFound { .. }
        ));
    }

    #[test]
    fn second_pick_loses_the_race() {
        let coord = setup();
        let task = create(&coord, &agent("alpha"), new_task("Contended work"));

        assert!(matches!(
            coord.pick_task(&agent("beta"), &task.id).unwrap(),
            PickOutcome::Claimed { .. }
        ));
        assert!(matches!(
            coord.pick_task(&agent("gamma"), &task.id).unwrap(),
            PickOutcome::Unavailable { .. }
        ));
        let stored = coord.get_task(&agent("alpha"), &task.id).unwrap().unwrap();
        assert_eq!(stored.assigned_to.as_deref(), Some("team/beta"));
    }

    #[test]
    fn illegal_moves_are_refused() {
        let coord = setup();
        let alpha = agent("alpha");
        let task = create(&coord, &alpha, new_task("Tighten CSP headers"));

        match set_status(&coord, &alpha, &task.id, TaskStatus::Done) {
            UpdateOutcome::IllegalTransition { from, to, .. } => {
                assert_eq!(from, TaskStatus::Open);
                assert_eq!(to, TaskStatus::Done);
            }
            other => panic!("expected IllegalTransition, got {:?}", other),
        }
        assert_eq!(
            coord.get_task(&alpha, &task.id).unwrap().unwrap().status,
            TaskStatus::Open
        );
    }

    #[test]
    fn starting_unclaimed_task_stamps_claim_fields() {
        let coord = setup();
        let alpha = agent("alpha");
        let task = create(&coord, &alpha, new_task("Profile cold start"));

        match set_status(&coord, &alpha, &task.id, TaskStatus::InProgress) {
            UpdateOutcome::Updated {
                task,
                previous_status,
                ..
            } => {
                assert_eq!(previous_status, TaskStatus::Open);
                assert_eq!(task.status, TaskStatus::InProgress);
                assert_eq!(task.assigned_to.as_deref(), Some("team/alpha"));
                assert!(task.claimed_at.is_some());
            }
            other => panic!("expected Updated, got {:?}", other),
        }
    }

    #[test]
    fn claiming_through_update_stamps_holder() {
        let coord = setup();
        let alpha = agent("alpha");
        let task = create(&coord, &alpha, new_task("Audit cookie flags"));

        match set_status(&coord, &alpha, &task.id, TaskStatus::Claimed) {
            UpdateOutcome::Updated { task, .. } => {
                assert_eq!(task.status, TaskStatus::Claimed);
                assert_eq!(task.assigned_to.as_deref(), Some("team/alpha"));
                assert!(task.claimed_at.is_some());
            }
            other => panic!("expected Updated, got {:?}", other),
        }
    }

    #[test]
    fn done_is_terminal_and_hints_milestone() {
        let coord = setup();
        let alpha = agent("alpha");
        let task = create(
            &coord,
            &alpha,
            NewTask {
                title: "Rate limit public API".to_string(),
                milestone: Some("v2".to_string()),
                ..Default::default()
            },
        );
        coord.pick_task(&alpha, &task.id).unwrap();
        set_status(&coord, &alpha, &task.id, TaskStatus::InProgress);

        match set_status(&coord, &alpha, &task.id, TaskStatus::Done) {
            UpdateOutcome::Updated {
                task,
                milestone_hint,
                ..
            } => {
                assert!(task.completed_at.is_some());
                assert_eq!(milestone_hint.as_deref(), Some("v2"));
            }
            other => panic!("expected Updated, got {:?}", other),
        }

        assert!(matches!(
            set_status(&coord, &alpha, &task.id, TaskStatus::InProgress),
            UpdateOutcome::IllegalTransition { .. }
        ));
        let reassign = TaskUpdate {
            assigned_to: Some("team/beta".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            coord.update_task(&alpha, &task.id, reassign).unwrap(),
            UpdateOutcome::IllegalTransition { .. }
        ));
    }

    #[test]
    fn notes_append_with_timestamps() {
        let coord = setup();
        let alpha = agent("alpha");
        let task = create(&coord, &alpha, new_task("Investigate flaky test"));

        for note in ["seen on CI only", "reproduced locally"] {
            let update = TaskUpdate {
                notes: Some(note.to_string()),
                ..Default::default()
            };
            coord.update_task(&alpha, &task.id, update).unwrap();
        }

        let stored = coord.get_task(&alpha, &task.id).unwrap().unwrap();
        let notes = stored.notes.unwrap();
        let lines: Vec<&str> = notes.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with('[')));
        assert!(lines[0].ends_with("seen on CI only"));
        assert!(lines[1].ends_with("reproduced locally"));
    }

    #[test]
    fn unblocking_clears_reason() {
        let coord = setup();
        let alpha = agent("alpha");
        let task = create(&coord, &alpha, new_task("Upgrade OpenSSL"));
        coord.pick_task(&alpha, &task.id).unwrap();

        let block = TaskUpdate {
            status: Some(TaskStatus::Blocked),
            blocked_reason: Some("waiting on vendor".to_string()),
            ..Default::default()
        };
        coord.update_task(&alpha, &task.id, block).unwrap();
        let stored = coord.get_task(&alpha, &task.id).unwrap().unwrap();
        assert_eq!(stored.blocked_reason.as_deref(), Some("waiting on vendor"));

        set_status(&coord, &alpha, &task.id, TaskStatus::InProgress);
        let stored = coord.get_task(&alpha, &task.id).unwrap().unwrap();
        assert!(stored.blocked_reason.is_none());
    }

    #[test]
    fn unknown_metadata_keys_survive_updates() {
        let coord = setup();
        let alpha = agent("alpha");
        let task = create(&coord, &alpha, new_task("Keep custom keys"));

        let mut meta = coord
            .store()
            .select(&Query::new().eq(Column::Id, task.id.clone()))
            .unwrap()
            .remove(0)
            .metadata;
        meta.insert("dashboard_color".to_string(), json!("teal"));
        coord
            .store()
            .update(
                &Query::new().eq(Column::Id, task.id.clone()),
                &Patch::metadata(meta),
            )
            .unwrap();

        coord.pick_task(&alpha, &task.id).unwrap();
        let row = coord
            .store()
            .select(&Query::new().eq(Column::Id, task.id.clone()))
            .unwrap()
            .remove(0);
        assert_eq!(row.meta_str("dashboard_color"), Some("teal"));
        assert_eq!(row.meta_str("status"), Some("claimed"));
    }

    #[test]
    fn list_tasks_filters_and_orders() {
        let coord = setup();
        let alpha = agent("alpha");
        let low = create(
            &coord,
            &alpha,
            NewTask {
                title: "Tidy changelog".to_string(),
                priority: Some(Priority::Low),
                ..Default::default()
            },
        );
        let urgent = create(
            &coord,
            &alpha,
            NewTask {
                title: "Patch session fixation".to_string(),
                priority: Some(Priority::Urgent),
                milestone: Some("Security Sprint".to_string()),
                ..Default::default()
            },
        );
        let normal_old = create(&coord, &alpha, new_task("Rename config keys"));
        let normal_new = create(&coord, &alpha, new_task("Cache avatar thumbnails"));

        let ids: Vec<String> = coord
            .list_tasks(&alpha, &TaskFilter::default())
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![urgent.id.clone(), normal_new.id, normal_old.id, low.id]);

        let by_milestone = coord
            .list_tasks(
                &alpha,
                &TaskFilter {
                    milestone: Some("security".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(by_milestone.len(), 1);
        assert_eq!(by_milestone[0].id, urgent.id);

        coord.pick_task(&alpha, &urgent.id).unwrap();
        let claimed = coord
            .list_tasks(
                &alpha,
                &TaskFilter {
                    statuses: vec![TaskStatus::Claimed],
                    assigned_to: Some("ALPHA".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(claimed.len(), 1);
    }
}

mod claim_tests {
    use super::*;

    fn scopes(coord: &Coordinator, ctx: &AgentContext, exclude: Option<&str>) -> Vec<(String, String)> {
        coord
            .active_claims(ctx, exclude)
            .unwrap()
            .into_iter()
            .map(|c| (c.agent, c.scope))
            .collect()
    }

    fn old_claim(coord: &Coordinator, agent: &str, scope: &str, age_ms: i64) {
        coord
            .store()
            .insert(NewMemory {
                fold_id: "fold".to_string(),
                agent: agent.to_string(),
                session_id: Some(format!("{}-old", agent)),
                message_type: "resource".to_string(),
                content: None,
                metadata: json!({ "event": "claim", "scope": scope, "files": [] })
                    .as_object()
                    .cloned()
                    .unwrap(),
                ts: now_ms() - age_ms,
            })
            .unwrap();
    }

    #[test]
    fn unclaim_releases_earlier_claims() {
        let coord = setup();
        let alpha = agent("alpha");
        coord.record_claim(&alpha, "auth refactor", &[], None).unwrap();
        coord.unclaim(&alpha).unwrap();
        assert!(scopes(&coord, &alpha, None).is_empty());

        coord.record_claim(&alpha, "billing export", &[], None).unwrap();
        assert_eq!(
            scopes(&coord, &alpha, None),
            vec![("team/alpha".to_string(), "billing export".to_string())]
        );
    }

    #[test]
    fn session_end_releases_without_unclaim() {
        let coord = setup();
        let beta = agent("beta");
        coord.record_claim(&beta, "search indexing", &[], None).unwrap();
        coord.end_session(&beta, Some("wrapped up"), None).unwrap();
        assert!(scopes(&coord, &beta, None).is_empty());
    }

    #[test]
    fn session_done_with_outcome_releases_too() {
        let coord = setup();
        let beta = agent("beta");
        coord.record_claim(&beta, "search indexing", &[], None).unwrap();
        let kind = coord
            .end_session(&beta, None, Some(SessionOutcome::Completed))
            .unwrap();
        assert_eq!(kind.as_str(), "session_done");
        assert!(scopes(&coord, &beta, None).is_empty());
    }

    #[test]
    fn newest_claim_per_agent_and_exclusion() {
        let coord = setup();
        let alpha = agent("alpha");
        let beta = agent("beta");
        coord.record_claim(&alpha, "first thing", &[], None).unwrap();
        coord.record_claim(&beta, "beta thing", &[], None).unwrap();
        coord.record_claim(&alpha, "second thing", &[], None).unwrap();

        assert_eq!(
            scopes(&coord, &alpha, None),
            vec![
                ("team/alpha".to_string(), "second thing".to_string()),
                ("team/beta".to_string(), "beta thing".to_string()),
            ]
        );
        assert_eq!(
            scopes(&coord, &alpha, Some("team/alpha")),
            vec![("team/beta".to_string(), "beta thing".to_string())]
        );
    }

    #[test]
    fn claims_outside_window_expire() {
        let coord = setup();
        old_claim(&coord, "team/ghost", "ancient work", 3 * 60 * 60 * 1000);
        assert!(scopes(&coord, &agent("alpha"), None).is_empty());
    }

    #[test]
    fn idle_filter_drops_silent_agents() {
        let settings = CoordinationConfig {
            idle_minutes: Some(30),
            ..Default::default()
        };
        let coord = setup_with(settings);
        old_claim(&coord, "team/quiet", "long running work", 45 * 60 * 1000);
        coord
            .record_claim(&agent("busy"), "fresh work", &[], None)
            .unwrap();

        assert_eq!(
            scopes(&coord, &agent("alpha"), None),
            vec![("team/busy".to_string(), "fresh work".to_string())]
        );

        let lenient = setup();
        old_claim(&lenient, "team/quiet", "long running work", 45 * 60 * 1000);
        assert_eq!(scopes(&lenient, &agent("alpha"), None).len(), 1);
    }

    #[test]
    fn claim_reports_scope_and_file_conflicts() {
        let coord = setup();
        let beta = agent("beta");
        coord
            .record_claim(
                &beta,
                "refactor session storage",
                &["src/session.rs".to_string()],
                None,
            )
            .unwrap();

        let outcome = coord
            .claim_scope(
                &agent("alpha"),
                "update readme badges",
                &["src/session.rs".to_string(), "README.md".to_string()],
                None,
            )
            .unwrap();
        match outcome {
            ClaimOutcome::Recorded {
                conflicts, others, ..
            } => {
                assert_eq!(others.len(), 1);
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].short_name, "beta");
                assert!(!conflicts[0].scope_overlap);
                assert_eq!(conflicts[0].shared_files, vec!["src/session.rs"]);
            }
            other => panic!("expected Recorded, got {:?}", other),
        }
    }

    #[test]
    fn file_with_max_claimants_is_locked() {
        let coord = setup();
        let file = vec!["src/auth.rs".to_string()];
        coord.record_claim(&agent("beta"), "auth tokens", &file, None).unwrap();
        coord.record_claim(&agent("gamma"), "auth sessions", &file, None).unwrap();

        match coord.claim_scope(&agent("alpha"), "auth cleanup", &file, None).unwrap() {
            ClaimOutcome::Locked { files } => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].file, "src/auth.rs");
                assert_eq!(files[0].holders.len(), 2);
            }
            other => panic!("expected Locked, got {:?}", other),
        }
        // nothing was written for alpha
        assert!(
            coord
                .active_claims(&agent("beta"), None)
                .unwrap()
                .iter()
                .all(|c| c.agent != "team/alpha")
        );
    }
}

mod availability_tests {
    use super::*;

    fn with_priority(title: &str, priority: Priority) -> NewTask {
        NewTask {
            title: title.to_string(),
            priority: Some(priority),
            ..Default::default()
        }
    }

    #[test]
    fn overlapping_claim_marks_task_contested() {
        let coord = setup();
        let alpha = agent("alpha");
        let auth = create(&coord, &alpha, new_task("Migrate authentication to JWT tokens"));
        let billing = create(&coord, &alpha, new_task("Write billing export report"));
        coord
            .record_claim(&agent("beta"), "migrate authentication tokens", &[], None)
            .unwrap();

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        assert_eq!(report.uncontested, 1);
        assert_eq!(report.contested, 1);
        assert_eq!(report.tasks[0].task.id, billing.id);
        assert_eq!(report.tasks[1].task.id, auth.id);

        let contention = report.tasks[1].contention.as_ref().unwrap();
        assert_eq!(contention.short_name, "beta");
        assert_eq!(contention.percent, 100);
    }

    #[test]
    fn description_counts_toward_contention() {
        let coord = setup();
        let alpha = agent("alpha");
        create(
            &coord,
            &alpha,
            NewTask {
                title: "Speed up builds".to_string(),
                description: Some("cache cargo registry between pipeline runs".to_string()),
                ..Default::default()
            },
        );
        coord
            .record_claim(&agent("beta"), "cargo registry cache", &[], None)
            .unwrap();

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        // {speed, builds, cache, cargo, registry, between, pipeline, runs} vs
        // {cargo, registry, cache}: 3/8
        let contention = report.tasks[0].contention.as_ref().unwrap();
        assert_eq!(contention.percent, 38);
    }

    #[test]
    fn own_claims_do_not_contest() {
        let coord = setup();
        let alpha = agent("alpha");
        create(&coord, &alpha, new_task("Migrate authentication to JWT tokens"));
        coord
            .record_claim(&alpha, "migrate authentication tokens", &[], None)
            .unwrap();

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        assert_eq!(report.contested, 0);
        assert!(report.claims.is_empty());
    }

    #[test]
    fn uncontested_first_then_priority() {
        let coord = setup();
        let alpha = agent("alpha");
        create(&coord, &alpha, with_priority("Tidy changelog entries", Priority::Low));
        create(&coord, &alpha, with_priority("Rotate signing keys", Priority::Urgent));
        create(&coord, &alpha, with_priority("Document deploy process", Priority::Normal));
        create(&coord, &alpha, with_priority("Harden upload validation", Priority::Urgent));
        create(&coord, &alpha, with_priority("Upgrade frontend bundler", Priority::High));
        coord
            .record_claim(&agent("beta"), "harden upload validation", &[], None)
            .unwrap();
        coord
            .record_claim(&agent("gamma"), "tidy changelog entries", &[], None)
            .unwrap();

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        let order: Vec<(bool, Priority)> = report
            .tasks
            .iter()
            .map(|t| (t.contention.is_some(), t.task.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                (false, Priority::Urgent),
                (false, Priority::High),
                (false, Priority::Normal),
                (true, Priority::Urgent),
                (true, Priority::Low),
            ]
        );
    }

    #[test]
    fn equal_keys_keep_recency_order() {
        let coord = setup();
        let alpha = agent("alpha");
        let older = create(&coord, &alpha, new_task("Prune stale branches"));
        let newer = create(&coord, &alpha, new_task("Collect crash dumps"));

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        let ids: Vec<&str> = report.tasks.iter().map(|t| t.task.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
    }

    #[test]
    fn filters_by_priority_floor_and_milestone() {
        let coord = setup();
        let alpha = agent("alpha");
        create(&coord, &alpha, with_priority("Tidy changelog entries", Priority::Low));
        create(&coord, &alpha, with_priority("Rotate signing keys", Priority::Urgent));
        create(
            &coord,
            &alpha,
            NewTask {
                title: "Upgrade frontend bundler".to_string(),
                priority: Some(Priority::High),
                milestone: Some("Perf Q3".to_string()),
                ..Default::default()
            },
        );

        let high_up = coord
            .list_available(
                &alpha,
                &AvailableFilter {
                    priority: Some(Priority::High),
                    milestone: None,
                },
            )
            .unwrap();
        assert_eq!(high_up.tasks.len(), 2);

        let perf = coord
            .list_available(
                &alpha,
                &AvailableFilter {
                    priority: None,
                    milestone: Some("perf".to_string()),
                },
            )
            .unwrap();
        assert_eq!(perf.tasks.len(), 1);
        assert_eq!(perf.tasks[0].task.title, "Upgrade frontend bundler");
    }

    #[test]
    fn only_open_tasks_are_listed() {
        let coord = setup();
        let alpha = agent("alpha");
        let picked = create(&coord, &alpha, new_task("Already taken"));
        create(&coord, &alpha, new_task("Still free"));
        coord.pick_task(&agent("beta"), &picked.id).unwrap();

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        assert_eq!(report.tasks.len(), 1);
        assert_eq!(report.tasks[0].task.title, "Still free");
    }

    #[test]
    fn quarter_overlap_is_contested() {
        let coord = setup();
        let alpha = agent("alpha");
        create(&coord, &alpha, new_task("Rotate signing keys nightly"));
        // {rotate, signing, keys, nightly} vs {signing}: 1/4
        coord.record_claim(&agent("beta"), "signing", &[], None).unwrap();

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        assert_eq!(report.contested, 1);
        let contention = report.tasks[0].contention.as_ref().unwrap();
        assert_eq!(contention.similarity, 0.25);
        assert_eq!(contention.percent, 25);
    }

    #[test]
    fn newest_qualifying_claim_wins_over_best_match() {
        let coord = setup();
        let alpha = agent("alpha");
        create(&coord, &alpha, new_task("Harden upload validation pipeline"));
        coord
            .record_claim(&agent("beta"), "harden upload validation pipeline", &[], None)
            .unwrap();
        coord
            .record_claim(&agent("gamma"), "upload validation", &[], None)
            .unwrap();

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        let contention = report.tasks[0].contention.as_ref().unwrap();
        assert_eq!(contention.short_name, "gamma");
        assert_eq!(contention.percent, 50);
    }
}

mod stored_row_tests {
    use super::*;

    fn insert_task_row(coord: &Coordinator, metadata: serde_json::Value) -> String {
        coord
            .store()
            .insert(NewMemory {
                fold_id: "fold".to_string(),
                agent: "team/legacy".to_string(),
                session_id: None,
                message_type: "task".to_string(),
                content: None,
                metadata: metadata.as_object().cloned().unwrap(),
                ts: now_ms(),
            })
            .unwrap()
            .id
    }

    #[test]
    fn unrecognized_field_values_do_not_hide_task() {
        let coord = setup();
        let alpha = agent("alpha");
        let id = insert_task_row(
            &coord,
            json!({
                "status": "open",
                "title": "Fix login bug",
                "priority": "critical",
                "notes": 42
            }),
        );

        let tasks = coord.list_tasks(&alpha, &TaskFilter::default()).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, id);
        assert_eq!(tasks[0].priority, Priority::Normal);
        assert!(tasks[0].notes.is_none());

        let report = coord.list_available(&alpha, &AvailableFilter::default()).unwrap();
        assert_eq!(report.tasks.len(), 1);

        match coord.create_task(&alpha, new_task("fix login bug")).unwrap() {
            CreateOutcome::Duplicate { existing } => assert_eq!(existing.id, id),
            other => panic!("expected Duplicate, got {:?}", other),
        }

        match coord.pick_task(&alpha, &id).unwrap() {
            PickOutcome::Claimed { task, .. } => {
                assert_eq!(task.status, TaskStatus::Claimed);
                assert_eq!(task.priority, Priority::Normal);
            }
            other => panic!("expected Claimed, got {:?}", other),
        }
    }
}

mod scenario_tests {
    use super::*;

    #[test]
    fn create_pick_and_observe_contention() {
        let coord = setup();
        let x = agent("x");
        let y = agent("y");
        let z = agent("z");

        let task = create(&coord, &x, new_task("Migrate auth to JWT"));
        assert_eq!(task.status, TaskStatus::Open);
        // a related open task that survives dedup ({document, auth, migrate, rollout, steps}: 2/5)
        let related = create(&coord, &x, new_task("Document auth migrate rollout steps"));

        let seen_by_y = coord.list_available(&y, &AvailableFilter::default()).unwrap();
        assert_eq!(seen_by_y.contested, 0);
        assert!(seen_by_y.tasks.iter().any(|t| t.task.id == task.id));

        let claim = match coord.pick_task(&y, &task.id).unwrap() {
            PickOutcome::Claimed { task: picked, claim } => {
                assert_eq!(picked.status, TaskStatus::Claimed);
                assert_eq!(picked.assigned_to.as_deref(), Some("team/y"));
                claim
            }
            other => panic!("expected Claimed, got {:?}", other),
        };
        assert_eq!(claim.scope, "Migrate auth to JWT");

        // z sees y's claim, whose scope matches the picked task's title exactly
        let claims = coord.active_claims(&z, Some(&z.agent)).unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].agent, "team/y");
        let conflicts = coord.detect_conflicts(&task.title, &[], &claims);
        assert_eq!(conflicts[0].percent, 100);

        // the picked task left the open list; the related one is now contested by y
        let seen_by_z = coord.list_available(&z, &AvailableFilter::default()).unwrap();
        assert!(seen_by_z.tasks.iter().all(|t| t.task.id != task.id));
        let entry = seen_by_z
            .tasks
            .iter()
            .find(|t| t.task.id == related.id)
            .unwrap();
        let contention = entry.contention.as_ref().unwrap();
        assert_eq!(contention.short_name, "y");
        assert_eq!(contention.percent, 40);

        // y finishes and leaves; the claim disappears for everyone
        coord
            .update_task(
                &y,
                &task.id,
                TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();
        coord
            .update_task(
                &y,
                &task.id,
                TaskUpdate {
                    status: Some(TaskStatus::Done),
                    notes: Some("merged".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        coord
            .end_session(&y, Some("auth migrated"), Some(SessionOutcome::Completed))
            .unwrap();

        assert!(coord.active_claims(&z, None).unwrap().is_empty());
        let after = coord.list_available(&z, &AvailableFilter::default()).unwrap();
        assert_eq!(after.contested, 0);
    }

    #[test]
    fn two_handles_share_one_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coord.db");
        let first = Coordinator::new(
            Arc::new(Database::open(&path).unwrap()),
            CoordinationConfig::default(),
        );
        let second = Coordinator::new(
            Arc::new(Database::open(&path).unwrap()),
            CoordinationConfig::default(),
        );

        let task = create(&first, &agent("alpha"), new_task("Shared file task"));
        assert!(matches!(
            second.pick_task(&agent("beta"), &task.id).unwrap(),
            PickOutcome::Claimed { .. }
        ));
        assert!(matches!(
            first.pick_task(&agent("gamma"), &task.id).unwrap(),
            PickOutcome::Unavailable { .. }
        ));
    }
}
