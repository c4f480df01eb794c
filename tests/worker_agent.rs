//! Worker agent behaviour against a hand-driven coordinator on the memory bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use fedrounds::capabilities::Trainer;
use fedrounds::channel::{Channel, MemoryBus, RetryPolicy};
use fedrounds::coordinator::COORDINATOR_ID;
use fedrounds::error::{TrainerError, WorkerError};
use fedrounds::event_log::{EventLog, MemoryLog};
use fedrounds::types::{
    AggregatedModel, Envelope, Metrics, ModelEntry, Payload, SelectionNotice, ServerArgs,
    StopNotice, Topic, Weights,
};
use fedrounds::worker::{WorkerAgent, WorkerState, WorkerSummary};

#[derive(Default)]
struct Spy {
    config: Mutex<Option<Value>>,
    weights: Mutex<Option<Weights>>,
    training_started: AtomicBool,
}

struct SpyTrainer {
    spy: Arc<Spy>,
    train_for: Duration,
    fail: bool,
}

impl SpyTrainer {
    fn new(spy: &Arc<Spy>) -> Self {
        Self {
            spy: Arc::clone(spy),
            train_for: Duration::ZERO,
            fail: false,
        }
    }
}

impl Trainer for SpyTrainer {
    fn train(&mut self) -> Result<(), TrainerError> {
        self.spy.training_started.store(true, Ordering::SeqCst);
        std::thread::sleep(self.train_for);
        if self.fail {
            return Err(TrainerError::Training("out of memory".to_string()));
        }
        Ok(())
    }

    fn weights(&self) -> Weights {
        vec![vec![0.5, 0.5]]
    }

    fn sample_count(&self) -> u64 {
        8
    }

    fn evaluate(&mut self) -> Result<f64, TrainerError> {
        Ok(0.25)
    }

    fn all_metrics(&mut self) -> Result<Metrics, TrainerError> {
        let mut metrics = Metrics::new();
        metrics.insert("accuracy".to_string(), json!(0.25));
        metrics.insert("loss".to_string(), json!(1.5));
        Ok(metrics)
    }

    fn set_weights(&mut self, weights: Weights) {
        *self.spy.weights.lock().unwrap() = Some(weights);
    }

    fn set_config(&mut self, args: &Value) -> Result<(), TrainerError> {
        *self.spy.config.lock().unwrap() = Some(args.clone());
        Ok(())
    }
}

struct Running {
    bus: MemoryBus,
    log: MemoryLog,
    handle: JoinHandle<Result<WorkerSummary, WorkerError>>,
}

async fn start(id: &str, trainer: SpyTrainer) -> Running {
    let bus = MemoryBus::with_history();
    let (events, log) = EventLog::memory();
    let agent = WorkerAgent::new(id, Arc::new(bus.clone()), Box::new(trainer))
        .with_events(events)
        .with_retry(RetryPolicy::no_retry());
    let handle = tokio::spawn(agent.run());
    wait_for(&bus, Topic::Register, 1).await;
    Running { bus, log, handle }
}

async fn send(bus: &MemoryBus, payload: Payload) {
    bus.publish(Envelope::new(COORDINATOR_ID, payload))
        .await
        .unwrap();
}

/// Polls the bus history until `count` messages were published on `topic`.
async fn wait_for(bus: &MemoryBus, topic: Topic, count: usize) -> Vec<Envelope> {
    for _ in 0..200 {
        let published = bus.published_on(topic);
        if published.len() >= count {
            return published;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} on {:?}", count, topic);
}

fn selection(id: &str, round: u64, selected: bool) -> Payload {
    Payload::Selection(SelectionNotice {
        id: id.to_string(),
        round,
        selected,
    })
}

fn aggregated(round: u64, workers: &[&str], weights: Weights) -> Payload {
    Payload::AggregatedModel(AggregatedModel {
        round,
        global: ModelEntry {
            weights: weights.clone(),
            extra: None,
        },
        per_worker: workers
            .iter()
            .map(|w| (w.to_string(), weights.clone()))
            .collect(),
    })
}

async fn stop(running: Running) -> WorkerSummary {
    send(&running.bus, Payload::Stop(StopNotice { stop: true })).await;
    tokio::time::timeout(Duration::from_secs(1), running.handle)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_register_carries_initial_evaluation() {
    let spy = Arc::new(Spy::default());
    let running = start("sta1", SpyTrainer::new(&spy)).await;

    let registered = running.bus.published_on(Topic::Register);
    match &registered[0].payload {
        Payload::Register(notice) => {
            assert_eq!(notice.id, "sta1");
            assert_eq!(notice.accuracy, Some(0.25));
            assert_eq!(notice.metrics["loss"], json!(1.5));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    assert_eq!(registered[0].sender, "sta1");

    stop(running).await;
}

#[tokio::test]
async fn test_server_args_apply_config_and_signal_ready() {
    let spy = Arc::new(Spy::default());
    let running = start("sta1", SpyTrainer::new(&spy)).await;

    send(
        &running.bus,
        Payload::ServerArgs(ServerArgs {
            id: "sta2".to_string(),
            args: Some(json!({"epochs": 9})),
        }),
    )
    .await;
    send(
        &running.bus,
        Payload::ServerArgs(ServerArgs {
            id: "sta1".to_string(),
            args: Some(json!({"epochs": 3})),
        }),
    )
    .await;

    let ready = wait_for(&running.bus, Topic::Ready, 1).await;
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].sender, "sta1");
    assert_eq!(*spy.config.lock().unwrap(), Some(json!({"epochs": 3})));

    stop(running).await;
}

#[tokio::test]
async fn test_selected_round_trains_then_evaluates() {
    let spy = Arc::new(Spy::default());
    let running = start("sta1", SpyTrainer::new(&spy)).await;

    send(&running.bus, selection("other", 1, true)).await;
    send(&running.bus, selection("sta1", 1, true)).await;

    let results = wait_for(&running.bus, Topic::TrainResult, 1).await;
    let Payload::TrainResult(result) = &results[0].payload else {
        panic!("expected a training result");
    };
    assert_eq!(result.round, 1);
    assert!(result.success);
    assert_eq!(result.weights, Some(vec![vec![0.5, 0.5]]));
    assert_eq!(result.sample_count, Some(8));

    send(&running.bus, aggregated(1, &["sta1"], vec![vec![2.0, 2.0]])).await;
    let reports = wait_for(&running.bus, Topic::EvalMetrics, 1).await;
    let Payload::EvalMetrics(report) = &reports[0].payload else {
        panic!("expected evaluation metrics");
    };
    assert_eq!(report.round, 1);
    assert_eq!(report.metrics["accuracy"], json!(0.25));
    assert_eq!(report.metrics["selected"], json!(true));
    assert_eq!(*spy.weights.lock().unwrap(), Some(vec![vec![2.0, 2.0]]));

    let log = running.log.clone();
    let summary = stop(running).await;
    assert_eq!(summary.rounds_seen, 1);
    assert_eq!(summary.rounds_trained, 1);
    assert_eq!(summary.final_state, WorkerState::Stopped);

    assert_eq!(
        log.tags(),
        vec![
            "INIT_EXPERIMENT",
            "T_ARRIVAL",
            "START_ROUND",
            "T_SELECT",
            "T_TRAIN",
            "T_RETURN_0",
            "T_SEND",
            "T_RETURN_1",
            "END_ROUND",
        ]
    );
}

#[tokio::test]
async fn test_unselected_round_only_evaluates() {
    let spy = Arc::new(Spy::default());
    let running = start("sta1", SpyTrainer::new(&spy)).await;

    send(&running.bus, selection("sta1", 1, false)).await;
    send(&running.bus, aggregated(1, &["sta1"], vec![vec![1.0, 1.0]])).await;
    // Redelivered model for the same round.
    send(&running.bus, aggregated(1, &["sta1"], vec![vec![1.0, 1.0]])).await;

    let reports = wait_for(&running.bus, Topic::EvalMetrics, 1).await;
    let Payload::EvalMetrics(report) = &reports[0].payload else {
        panic!("expected evaluation metrics");
    };
    assert_eq!(report.metrics["selected"], json!(false));
    assert!(running.bus.published_on(Topic::TrainResult).is_empty());
    assert!(!spy.training_started.load(Ordering::SeqCst));
    assert!(running
        .log
        .lines()
        .iter()
        .any(|line| line.ends_with("T_SELECT False")));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(running.bus.published_on(Topic::EvalMetrics).len(), 1);

    let summary = stop(running).await;
    assert_eq!(summary.rounds_trained, 0);
}

#[tokio::test]
async fn test_training_failure_is_reported() {
    let spy = Arc::new(Spy::default());
    let trainer = SpyTrainer {
        fail: true,
        ..SpyTrainer::new(&spy)
    };
    let running = start("sta1", trainer).await;

    send(&running.bus, selection("sta1", 4, true)).await;
    let results = wait_for(&running.bus, Topic::TrainResult, 1).await;
    let Payload::TrainResult(result) = &results[0].payload else {
        panic!("expected a training result");
    };
    assert_eq!(result.round, 4);
    assert!(!result.success);
    assert!(result.weights.is_none());
    assert!(running
        .log
        .lines()
        .iter()
        .any(|line| line.contains("T_TRAIN False")));

    // The worker still takes part in evaluation.
    send(&running.bus, aggregated(4, &["sta1"], vec![vec![0.0, 0.0]])).await;
    wait_for(&running.bus, Topic::EvalMetrics, 1).await;

    let summary = stop(running).await;
    assert_eq!(summary.rounds_failed, 1);
}

#[tokio::test]
async fn test_stop_interrupts_training() {
    let spy = Arc::new(Spy::default());
    let trainer = SpyTrainer {
        train_for: Duration::from_secs(2),
        ..SpyTrainer::new(&spy)
    };
    let bus = MemoryBus::with_history();
    let agent = WorkerAgent::new("sta1", Arc::new(bus.clone()), Box::new(trainer))
        .with_retry(RetryPolicy::no_retry());
    let mut stopped = agent.stop_signal();
    let handle = tokio::spawn(agent.run());
    wait_for(&bus, Topic::Register, 1).await;

    send(&bus, selection("sta1", 1, true)).await;
    for _ in 0..100 {
        if spy.training_started.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(spy.training_started.load(Ordering::SeqCst));

    send(&bus, Payload::Stop(StopNotice { stop: true })).await;
    let summary = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("stop must not wait for training")
        .unwrap()
        .unwrap();

    assert_eq!(summary.final_state, WorkerState::Stopped);
    assert_eq!(summary.rounds_trained, 0);
    assert!(*stopped.borrow_and_update());
    assert!(bus.published_on(Topic::TrainResult).is_empty());
}
