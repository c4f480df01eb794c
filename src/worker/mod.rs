//! Worker agent: one per process, reacting to coordinator messages and
//! driving a private [`Trainer`].
//!
//! Training runs on a blocking task so the agent keeps draining its inbox
//! while a long training step is in progress; a stop notice received
//! mid-training abandons the task and the agent shuts down immediately.

pub mod state_machine;

pub use state_machine::{WorkerEvent, WorkerState, WorkerStateMachine};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capabilities::Trainer;
use crate::channel::{publish_with_retry, Channel, RetryPolicy};
use crate::error::WorkerError;
use crate::event_log::EventLog;
use crate::types::event::flag;
use crate::types::{
    AggregatedModel, Envelope, EvalReport, EventTag, Metrics, Payload, ReadyNotice,
    RegisterNotice, RoundId, SelectionNotice, ServerArgs, Topic, TrainResult, Weights, WorkerId,
    ACCURACY_KEY,
};

type SharedTrainer = Arc<Mutex<Box<dyn Trainer>>>;

struct TrainedModel {
    weights: Weights,
    sample_count: u64,
    training_args: Option<Value>,
}

struct TrainingOutcome {
    result: Result<TrainedModel, String>,
    elapsed_secs: f64,
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub final_state: WorkerState,
    pub rounds_seen: u64,
    pub rounds_trained: u64,
    pub rounds_failed: u64,
}

pub struct WorkerAgent {
    id: WorkerId,
    channel: Arc<dyn Channel>,
    trainer: SharedTrainer,
    events: EventLog,
    retry: RetryPolicy,
    state: WorkerState,
    round: RoundId,
    selected: bool,
    last_evaluated: Option<RoundId>,
    training: Option<JoinHandle<TrainingOutcome>>,
    stop: watch::Sender<bool>,
    summary: WorkerSummary,
}

impl WorkerAgent {
    pub fn new(
        id: impl Into<WorkerId>,
        channel: Arc<dyn Channel>,
        trainer: Box<dyn Trainer>,
    ) -> Self {
        let id = id.into();
        let (stop, _) = watch::channel(false);
        Self {
            summary: WorkerSummary {
                id: id.clone(),
                final_state: WorkerState::Idle,
                rounds_seen: 0,
                rounds_trained: 0,
                rounds_failed: 0,
            },
            id,
            channel,
            trainer: Arc::new(Mutex::new(trainer)),
            events: EventLog::disabled(),
            retry: RetryPolicy::default(),
            state: WorkerState::Idle,
            round: 0,
            selected: false,
            last_evaluated: None,
            training: None,
            stop,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Flips to `true` once a stop notice has been received.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    /// Registers with the coordinator and serves rounds until stopped.
    pub async fn run(mut self) -> Result<WorkerSummary, WorkerError> {
        let mut inbox = self.channel.subscribe(&Topic::worker_inbox()).await?;
        self.events.mark(EventTag::InitExperiment);
        self.announce().await?;
        self.events.mark(EventTag::Arrival);
        log::info!("Worker {} connected", self.id);

        while self.state != WorkerState::Stopped {
            tokio::select! {
                outcome = join_training(&mut self.training) => {
                    self.report_training(outcome).await?;
                }
                next = inbox.next() => match next {
                    Some(envelope) => self.handle(envelope).await?,
                    None => {
                        log::warn!("Worker {} inbox closed before a stop notice", self.id);
                        break;
                    }
                },
            }
        }

        if let Some(task) = self.training.take() {
            task.abort();
        }
        self.summary.final_state = self.state;
        Ok(self.summary)
    }

    async fn announce(&mut self) -> Result<(), WorkerError> {
        let (accuracy, metrics) = {
            let mut trainer = lock(&self.trainer);
            let accuracy = trainer
                .evaluate()
                .map_err(|e| log::warn!("Initial evaluation failed on {}: {}", self.id, e))
                .ok();
            let metrics = trainer.all_metrics().unwrap_or_default();
            (accuracy, metrics)
        };

        self.publish(Payload::Register(RegisterNotice {
            id: self.id.clone(),
            accuracy,
            metrics,
        }))
        .await
    }

    async fn handle(&mut self, envelope: Envelope) -> Result<(), WorkerError> {
        if !envelope.payload.is_addressed_to(&self.id) {
            return Ok(());
        }

        match envelope.payload {
            Payload::ServerArgs(args) => self.on_server_args(args).await,
            Payload::Selection(notice) => self.on_selection(notice),
            Payload::AggregatedModel(model) => self.on_aggregated_model(model).await,
            Payload::Stop(_) => {
                self.on_stop();
                Ok(())
            }
            other => {
                log::debug!(
                    "Worker {} ignoring {} message",
                    self.id,
                    other.topic().as_str()
                );
                Ok(())
            }
        }
    }

    async fn on_server_args(&mut self, message: ServerArgs) -> Result<(), WorkerError> {
        if let Some(args) = &message.args {
            let applied = lock(&self.trainer).set_config(args);
            if let Err(e) = applied {
                log::warn!("Worker {} rejected argument update: {}", self.id, e);
            }
        }
        self.publish(Payload::Ready(ReadyNotice {
            id: self.id.clone(),
        }))
        .await
    }

    fn on_selection(&mut self, notice: SelectionNotice) -> Result<(), WorkerError> {
        if notice.round <= self.round {
            log::debug!(
                "Worker {} ignoring repeated selection for round {}",
                self.id,
                notice.round
            );
            return Ok(());
        }

        let event = if notice.selected {
            WorkerEvent::Selected
        } else {
            WorkerEvent::NotSelected
        };
        if WorkerStateMachine::next(self.state, event).is_none() {
            log::warn!(
                "Worker {} in state {} cannot start round {}",
                self.id,
                self.state.as_str(),
                notice.round
            );
            return Ok(());
        }

        self.round = notice.round;
        self.selected = notice.selected;
        self.summary.rounds_seen += 1;
        self.events.record(EventTag::StartRound, &[&self.round]);
        self.events.record(EventTag::Select, &[&flag(notice.selected)]);
        WorkerStateMachine::transition(&self.id, &mut self.state, event)?;

        if notice.selected {
            log::info!("Worker {} selected for round {}", self.id, self.round);
            self.training = Some(spawn_training(Arc::clone(&self.trainer)));
        } else {
            log::info!("Worker {} not selected for round {}", self.id, self.round);
        }
        Ok(())
    }

    async fn report_training(&mut self, outcome: TrainingOutcome) -> Result<(), WorkerError> {
        WorkerStateMachine::transition(&self.id, &mut self.state, WorkerEvent::TrainingFinished)?;

        let mut result = TrainResult::failed(self.id.clone(), self.round);
        result.train_secs = outcome.elapsed_secs;
        match outcome.result {
            Ok(model) => {
                self.summary.rounds_trained += 1;
                result.success = true;
                result.weights = Some(model.weights);
                result.sample_count = Some(model.sample_count);
                result.training_args = model.training_args;
            }
            Err(e) => {
                self.summary.rounds_failed += 1;
                log::warn!("Worker {} failed training in round {}: {}", self.id, self.round, e);
            }
        }

        self.events.record(
            EventTag::Train,
            &[&flag(result.success), &outcome.elapsed_secs],
        );
        self.publish(Payload::TrainResult(result)).await?;
        WorkerStateMachine::transition(&self.id, &mut self.state, WorkerEvent::TrainReported)?;
        self.events.mark(EventTag::Return0);
        Ok(())
    }

    async fn on_aggregated_model(&mut self, model: AggregatedModel) -> Result<(), WorkerError> {
        if self.last_evaluated == Some(model.round) {
            log::debug!("Worker {} already evaluated round {}", self.id, model.round);
            return Ok(());
        }
        if WorkerStateMachine::next(self.state, WorkerEvent::AggregateReceived).is_none() {
            log::warn!(
                "Worker {} in state {} ignoring aggregated model for round {}",
                self.id,
                self.state.as_str(),
                model.round
            );
            return Ok(());
        }

        WorkerStateMachine::transition(&self.id, &mut self.state, WorkerEvent::AggregateReceived)?;
        self.events.mark(EventTag::Send);

        let metrics = {
            let mut trainer = lock(&self.trainer);
            if let Some(weights) = model.weights_for(&self.id) {
                trainer.set_weights(weights.clone());
            }
            if let Some(extra) = &model.global.extra {
                trainer.on_aggregation_extra_info(extra);
            }
            evaluation_metrics(&mut **trainer, &self.id)
        };
        let mut metrics = metrics;
        metrics.insert("selected".to_string(), json!(self.selected));
        WorkerStateMachine::transition(&self.id, &mut self.state, WorkerEvent::Evaluated)?;

        self.publish(Payload::EvalMetrics(EvalReport {
            id: self.id.clone(),
            round: model.round,
            metrics,
        }))
        .await?;
        WorkerStateMachine::transition(&self.id, &mut self.state, WorkerEvent::EvalReported)?;
        self.last_evaluated = Some(model.round);

        self.events.mark(EventTag::Return1);
        self.events.record(EventTag::EndRound, &[&self.round]);
        Ok(())
    }

    fn on_stop(&mut self) {
        log::info!("Worker {} received stop notice", self.id);
        if let Some(task) = self.training.take() {
            task.abort();
        }
        self.state = WorkerState::Stopped;
        self.stop.send_replace(true);
    }

    async fn publish(&self, payload: Payload) -> Result<(), WorkerError> {
        let envelope = Envelope::new(self.id.clone(), payload);
        publish_with_retry(self.channel.as_ref(), envelope, &self.retry).await?;
        Ok(())
    }
}

fn evaluation_metrics(trainer: &mut dyn Trainer, worker: &str) -> Metrics {
    match trainer.all_metrics() {
        Ok(metrics) => metrics,
        Err(e) => {
            log::warn!("Worker {} failed evaluation: {}", worker, e);
            let mut metrics = Metrics::new();
            metrics.insert("error".to_string(), json!(e.to_string()));
            metrics.insert(ACCURACY_KEY.to_string(), Value::Null);
            metrics
        }
    }
}

fn spawn_training(trainer: SharedTrainer) -> JoinHandle<TrainingOutcome> {
    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let mut trainer = lock(&trainer);
        let result = trainer
            .train()
            .map(|()| TrainedModel {
                weights: trainer.weights(),
                sample_count: trainer.sample_count(),
                training_args: trainer.extra_training_args(),
            })
            .map_err(|e| e.to_string());
        TrainingOutcome {
            result,
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    })
}

/// Resolves when the in-flight training task finishes; pends forever when
/// nothing is training.
async fn join_training(task: &mut Option<JoinHandle<TrainingOutcome>>) -> TrainingOutcome {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(e) => TrainingOutcome {
            result: Err(format!("training task failed: {}", e)),
            elapsed_secs: 0.0,
        },
    };
    *task = None;
    outcome
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
