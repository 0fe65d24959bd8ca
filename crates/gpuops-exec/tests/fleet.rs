use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use gpuops_exec::error::ExecError;
use gpuops_exec::factory::ExecutorFactory;
use gpuops_exec::fleet::{FleetExecutor, outputs};
use gpuops_exec::result::CommandResult;
use gpuops_exec::target::Target;
use gpuops_exec::traits::RemoteExecutor;

/// What the mock does for a given node
#[derive(Clone)]
enum Behavior {
    Print { status: i32, stdout: String },
    Unreachable,
    Panic,
}

#[derive(Default)]
struct Probe {
    running: AtomicUsize,
    peak: AtomicUsize,
    spawned: AtomicUsize,
    finished: Mutex<Vec<String>>,
}

struct MockFactory {
    delays: HashMap<String, Duration>,
    behaviors: HashMap<String, Behavior>,
    default_status: i32,
    probe: Arc<Probe>,
}

impl MockFactory {
    fn new() -> Self {
        Self {
            delays: HashMap::new(),
            behaviors: HashMap::new(),
            default_status: 0,
            probe: Arc::new(Probe::default()),
        }
    }

    fn delay(mut self, host: &str, ms: u64) -> Self {
        self.delays
            .insert(host.to_string(), Duration::from_millis(ms));
        self
    }

    fn behave(mut self, host: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(host.to_string(), behavior);
        self
    }

    fn exit_status(mut self, status: i32) -> Self {
        self.default_status = status;
        self
    }
}

impl ExecutorFactory for MockFactory {
    fn create_executor(&self, target: &Target) -> Result<Box<dyn RemoteExecutor>, ExecError> {
        self.probe.spawned.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(&target.id)
            .cloned()
            .unwrap_or_else(|| Behavior::Print {
                status: self.default_status,
                stdout: format!("{}-output", target.id),
            });

        Ok(Box::new(MockExecutor {
            host: target.id.clone(),
            delay: self.delays.get(&target.id).copied().unwrap_or_default(),
            behavior,
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct MockExecutor {
    host: String,
    delay: Duration,
    behavior: Behavior,
    probe: Arc<Probe>,
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let now = self.probe.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.probe.running.fetch_sub(1, Ordering::SeqCst);
        self.probe.finished.lock().unwrap().push(self.host.clone());

        match &self.behavior {
            Behavior::Print { status, stdout } => Ok(CommandResult {
                status: *status,
                stdout: if cmd.contains("echo done") {
                    "done".to_string()
                } else {
                    stdout.clone()
                },
                stderr: String::new(),
                duration: self.delay,
            }),
            Behavior::Unreachable => Err(ExecError::ConnectionFailed(format!(
                "{}: No route to host",
                self.host
            ))),
            Behavior::Panic => panic!("mock transport exploded"),
        }
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        tokio::time::timeout(timeout, self.run(cmd))
            .await
            .map_err(|_| ExecError::Timeout { timeout })?
    }

    fn executor_type(&self) -> &'static str {
        "mock"
    }
}

fn targets(ids: &[&str]) -> Vec<Target> {
    ids.iter().map(|id| Target::new(*id)).collect()
}

#[tokio::test]
async fn test_results_follow_input_order_not_completion_order() {
    let factory = MockFactory::new()
        .delay("node-a", 60)
        .delay("node-b", 0)
        .delay("node-c", 30);
    let probe = Arc::clone(&factory.probe);
    let fleet = FleetExecutor::new(Arc::new(factory));

    let outcomes = fleet
        .run(&targets(&["node-a", "node-b", "node-c"]), "hostname")
        .await;

    assert_eq!(
        outputs(&outcomes),
        ["node-a-output", "node-b-output", "node-c-output"]
    );
    assert_eq!(*probe.finished.lock().unwrap(), ["node-b", "node-c", "node-a"]);
    assert!(outcomes.iter().all(|o| o.succeeded));
}

#[tokio::test]
async fn test_later_task_finishing_first_keeps_position() {
    let ids: Vec<String> = (0..8).map(|i| format!("gpu-{i}")).collect();
    let mut factory = MockFactory::new();
    for (i, id) in ids.iter().enumerate() {
        // reverse delays: the last node finishes first
        factory = factory.delay(id, 5 * (8 - i as u64));
    }
    let fleet = FleetExecutor::new(Arc::new(factory));

    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let outcomes = fleet.run(&targets(&refs), "hostname").await;

    let got: Vec<&str> = outcomes.iter().map(|o| o.target.id.as_str()).collect();
    assert_eq!(got, refs);
}

#[tokio::test]
async fn test_nonzero_exit_is_returned_as_text() {
    let fleet = FleetExecutor::new(Arc::new(MockFactory::new().exit_status(1)));

    let outcomes = fleet.run(&targets(&["x", "y"]), "false; echo done").await;

    assert_eq!(outputs(&outcomes), ["done", "done"]);
    assert!(outcomes.iter().all(|o| !o.succeeded && o.status == Some(1)));
}

#[tokio::test]
async fn test_unreachable_node_does_not_sink_the_batch() {
    let factory = MockFactory::new().behave("node-b", Behavior::Unreachable);
    let fleet = FleetExecutor::new(Arc::new(factory));

    let outcomes = fleet
        .run(&targets(&["node-a", "node-b", "node-c"]), "hostname")
        .await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].output, "node-a-output");
    assert_eq!(
        outcomes[1].output,
        "connection failed: node-b: No route to host"
    );
    assert_eq!(outcomes[1].status, None);
    assert!(!outcomes[1].succeeded);
    assert_eq!(outcomes[2].output, "node-c-output");
}

#[tokio::test]
async fn test_panicking_task_is_reported_in_its_slot() {
    let factory = MockFactory::new().behave("node-b", Behavior::Panic);
    let fleet = FleetExecutor::new(Arc::new(factory));

    let outcomes = fleet
        .run(&targets(&["node-a", "node-b", "node-c"]), "hostname")
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].succeeded);
    assert!(!outcomes[1].succeeded);
    assert!(outcomes[1].output.starts_with("task aborted"));
    assert_eq!(outcomes[1].target.id, "node-b");
    assert!(outcomes[2].succeeded);
}

#[tokio::test]
async fn test_empty_batch_spawns_nothing() {
    let factory = MockFactory::new();
    let probe = Arc::clone(&factory.probe);
    let fleet = FleetExecutor::new(Arc::new(factory));

    let outcomes = fleet.run(&[], "hostname").await;

    assert!(outcomes.is_empty());
    assert_eq!(probe.spawned.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_duplicate_targets_run_independently() {
    let factory = MockFactory::new();
    let probe = Arc::clone(&factory.probe);
    let fleet = FleetExecutor::new(Arc::new(factory));

    let outcomes = fleet.run(&targets(&["a", "a", "b"]), "hostname").await;

    assert_eq!(outputs(&outcomes), ["a-output", "a-output", "b-output"]);
    assert_eq!(probe.spawned.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unbounded_runs_all_nodes_at_once() {
    let mut factory = MockFactory::new();
    let ids: Vec<String> = (0..6).map(|i| format!("n{i}")).collect();
    for id in &ids {
        factory = factory.delay(id, 40);
    }
    let probe = Arc::clone(&factory.probe);
    let fleet = FleetExecutor::new(Arc::new(factory));

    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    fleet.run(&targets(&refs), "hostname").await;

    assert_eq!(probe.peak.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_max_parallel_bounds_sessions() {
    let mut factory = MockFactory::new();
    let ids: Vec<String> = (0..6).map(|i| format!("n{i}")).collect();
    for id in &ids {
        factory = factory.delay(id, 20);
    }
    let probe = Arc::clone(&factory.probe);
    let fleet = FleetExecutor::new(Arc::new(factory)).with_max_parallel(2);

    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let outcomes = fleet.run(&targets(&refs), "hostname").await;

    assert_eq!(outcomes.len(), 6);
    assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    let got: Vec<&str> = outcomes.iter().map(|o| o.target.id.as_str()).collect();
    assert_eq!(got, refs);
}

#[tokio::test]
async fn test_timeout_marks_only_the_slow_node() {
    let factory = MockFactory::new().delay("slow", 500).delay("fast", 0);
    let fleet =
        FleetExecutor::new(Arc::new(factory)).with_timeout(Duration::from_millis(50));

    let outcomes = fleet.run(&targets(&["slow", "fast"]), "hostname").await;

    assert!(!outcomes[0].succeeded);
    assert!(outcomes[0].output.starts_with("command timed out"));
    assert!(outcomes[1].succeeded);
}

#[test]
fn test_zero_max_parallel_means_unbounded() {
    let fleet = FleetExecutor::new(Arc::new(MockFactory::new())).with_max_parallel(0);
    assert_eq!(fleet.max_parallel(), None);
}
