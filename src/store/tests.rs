//! Store Module Tests
//!
//! Covers the key-value contract (unique insert, atomic replace, lookup),
//! the filtered task listing with pagination, and the view projections.

#[cfg(test)]
mod tests {
    use crate::nodes::types::Node;
    use crate::store::{MemoryStore, StoreError};
    use crate::tasks::types::{ExecutorLog, State, Task, TaskLog, View};

    use chrono::{TimeZone, Utc};

    fn task(id: &str, name: &str, state: State, host: &str, minute: u32) -> Task {
        Task {
            id: id.to_string(),
            name: name.to_string(),
            state,
            host: host.to_string(),
            creation_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()),
            ..Task::default()
        }
    }

    fn node(host: &str, active: bool) -> Node {
        Node {
            host: host.to_string(),
            port: 50051,
            active,
            cpu_cores: 4,
            ram_gb: 8.0,
            identified_cpu_cores: 4,
            identified_ram_gb: 8.0,
            usage: None,
        }
    }

    // ============================================================
    // TEST 1: Task table contract
    // ============================================================

    #[test]
    fn test_save_task_rejects_duplicate_id() {
        let store = MemoryStore::new();
        store
            .save_task(task("t1", "first", State::Queued, "", 0))
            .unwrap();

        let result = store.save_task(task("t1", "again", State::Queued, "", 1));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_get_task_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_task("missing"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_task_replaces_record() {
        let store = MemoryStore::new();
        store
            .save_task(task("t1", "first", State::Queued, "", 0))
            .unwrap();

        let mut updated = task("t1", "first", State::Initializing, "worker-a", 0);
        updated.logs.push(TaskLog::default());
        store.update_task(updated).unwrap();

        let fetched = store.get_task("t1").unwrap();
        assert_eq!(fetched.state, State::Initializing);
        assert_eq!(fetched.host, "worker-a");
        assert_eq!(fetched.logs.len(), 1);
    }

    #[test]
    fn test_update_task_unknown_id_fails() {
        let store = MemoryStore::new();
        let result = store.update_task(task("ghost", "x", State::Queued, "", 0));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    // ============================================================
    // TEST 2: Filtered listing and pagination
    // ============================================================

    #[test]
    fn test_list_tasks_filters_by_state_and_host() {
        let store = MemoryStore::new();
        store
            .save_task(task("t1", "a", State::Queued, "", 0))
            .unwrap();
        store
            .save_task(task("t2", "b", State::Running, "worker-a", 1))
            .unwrap();
        store
            .save_task(task("t3", "c", State::Running, "worker-b", 2))
            .unwrap();
        store
            .save_task(task("t4", "d", State::Complete, "worker-a", 3))
            .unwrap();

        let running = store.list_tasks(0, 0, View::Full, None, None, Some(&[State::Running]));
        assert_eq!(running.len(), 2);

        let hosts = vec!["worker-a".to_string()];
        let on_a = store.list_tasks(
            0,
            0,
            View::Full,
            None,
            Some(&hosts),
            Some(&[State::Running]),
        );
        assert_eq!(on_a.len(), 1);
        assert_eq!(on_a[0].id, "t2");
    }

    #[test]
    fn test_list_tasks_filters_by_name_prefix() {
        let store = MemoryStore::new();
        store
            .save_task(task("t1", "align-sample-1", State::Queued, "", 0))
            .unwrap();
        store
            .save_task(task("t2", "align-sample-2", State::Queued, "", 1))
            .unwrap();
        store
            .save_task(task("t3", "call-variants", State::Queued, "", 2))
            .unwrap();

        let aligned = store.list_tasks(0, 0, View::Full, Some("align-"), None, None);
        assert_eq!(aligned.len(), 2);
    }

    #[test]
    fn test_list_tasks_pagination_is_ordered_by_creation_time() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .save_task(task(
                    &format!("t{}", i),
                    "batch",
                    State::Queued,
                    "",
                    i as u32,
                ))
                .unwrap();
        }

        let first = store.list_tasks(2, 0, View::Full, None, None, None);
        let second = store.list_tasks(2, 2, View::Full, None, None, None);
        let third = store.list_tasks(2, 4, View::Full, None, None, None);

        assert_eq!(
            first.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["t0", "t1"]
        );
        assert_eq!(
            second.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["t2", "t3"]
        );
        assert_eq!(
            third.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["t4"]
        );
    }

    // ============================================================
    // TEST 3: View projection
    // ============================================================

    fn task_with_logs() -> Task {
        let mut t = task("t1", "noisy", State::Complete, "worker-a", 0);
        t.logs.push(TaskLog {
            system_logs: vec!["placement retried".to_string()],
            executor_logs: vec![ExecutorLog {
                stdout: "result line".to_string(),
                stderr: "warning line".to_string(),
                exit_code: 0,
                ..ExecutorLog::default()
            }],
            ..TaskLog::default()
        });
        t
    }

    #[test]
    fn test_minimal_view_keeps_only_id_and_state() {
        let store = MemoryStore::new();
        store.save_task(task_with_logs()).unwrap();

        let tasks = store.list_tasks(0, 0, View::Minimal, None, None, None);
        assert_eq!(tasks[0].id, "t1");
        assert_eq!(tasks[0].state, State::Complete);
        assert!(tasks[0].name.is_empty());
        assert!(tasks[0].host.is_empty());
        assert!(tasks[0].logs.is_empty());
    }

    #[test]
    fn test_basic_view_drops_output_and_system_logs() {
        let store = MemoryStore::new();
        store.save_task(task_with_logs()).unwrap();

        let tasks = store.list_tasks(0, 0, View::Basic, None, None, None);
        let log = &tasks[0].logs[0];
        assert!(log.system_logs.is_empty());
        assert!(log.executor_logs[0].stdout.is_empty());
        assert!(log.executor_logs[0].stderr.is_empty());
        // The rest of the record survives.
        assert_eq!(tasks[0].name, "noisy");
        assert_eq!(log.executor_logs[0].exit_code, 0);
    }

    #[test]
    fn test_full_view_returns_everything() {
        let store = MemoryStore::new();
        store.save_task(task_with_logs()).unwrap();

        let tasks = store.list_tasks(0, 0, View::Full, None, None, None);
        assert_eq!(tasks[0].logs[0].executor_logs[0].stdout, "result line");
        assert_eq!(tasks[0].logs[0].system_logs[0], "placement retried");
    }

    // ============================================================
    // TEST 4: Node table
    // ============================================================

    #[test]
    fn test_add_node_is_idempotent_upsert() {
        let store = MemoryStore::new();
        store.add_node(node("worker-a", true));

        let mut replacement = node("worker-a", false);
        replacement.cpu_cores = 16;
        store.add_node(replacement);

        let fetched = store.get_node("worker-a").unwrap();
        assert!(!fetched.active);
        assert_eq!(fetched.cpu_cores, 16);
        assert_eq!(store.list_nodes(None).len(), 1);
    }

    #[test]
    fn test_list_nodes_filters_by_active() {
        let store = MemoryStore::new();
        store.add_node(node("worker-a", true));
        store.add_node(node("worker-b", false));
        store.add_node(node("worker-c", true));

        assert_eq!(store.list_nodes(Some(true)).len(), 2);
        assert_eq!(store.list_nodes(Some(false)).len(), 1);
        assert_eq!(store.list_nodes(None).len(), 3);
    }

    #[test]
    fn test_update_node_unknown_host_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_node(node("ghost", true)),
            Err(StoreError::NotFound(_))
        ));
    }
}
