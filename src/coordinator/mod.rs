//! Round coordination: worker pool, phase progression, termination.
//!
//! Inbound messages are applied by a dispatcher task while the round loop
//! waits on the shared state. State lives in a `watch` channel so every
//! mutation wakes the waiters; waits are event-driven and optionally bounded.

pub mod state;

pub use state::{CoordinatorState, ResponseOutcome, Round, WorkerRecord};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capabilities::{Aggregator, Registry, Selector};
use crate::channel::{publish_with_retry, Channel, RetryPolicy};
use crate::config::CoordinatorConfig;
use crate::error::{ConfigError, CoordinatorError};
use crate::event_log::EventLog;
use crate::storage::{BestModel, ModelStore};
use crate::types::event::flag;
use crate::types::{
    AggregatedModel, Decision, Envelope, EvalReport, EventTag, ModelEntry, Payload, Phase,
    RegisterNotice, RoundId, SelectionNotice, ServerArgs, StopNotice, TrainResult, Topic,
    WorkerId,
};

/// Sender identity used on every coordinator message.
pub const COORDINATOR_ID: &str = "coordinator";

/// Outcome of one completed round, before the stop decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub round: RoundId,
    pub selected: Vec<WorkerId>,
    pub participants: Vec<WorkerId>,
    pub trained: Vec<WorkerId>,
    pub failed: Vec<WorkerId>,
    /// Workers that missed a response deadline this round.
    pub non_responsive: Vec<WorkerId>,
    pub mean_accuracy: Option<f64>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSummary {
    pub rounds: Vec<RoundReport>,
    pub decision: Decision,
    pub best: Option<BestModel>,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    channel: Arc<dyn Channel>,
    selector: Box<dyn Selector>,
    aggregator: Box<dyn Aggregator>,
    store: Arc<dyn ModelStore>,
    events: EventLog,
    retry: RetryPolicy,
    state: watch::Sender<CoordinatorState>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        channel: Arc<dyn Channel>,
        selector: Box<dyn Selector>,
        aggregator: Box<dyn Aggregator>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        let (state, _) = watch::channel(CoordinatorState::default());
        Self {
            config,
            channel,
            selector,
            aggregator,
            store,
            events: EventLog::disabled(),
            retry: RetryPolicy::default(),
            state,
        }
    }

    /// Builds the selector and aggregator named in `config` from `registry`.
    pub fn from_registry(
        config: CoordinatorConfig,
        registry: &Registry,
        channel: Arc<dyn Channel>,
        store: Arc<dyn ModelStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let selector = registry.selector(&config.selector.name, &config.selector.args)?;
        let aggregator = registry.aggregator(&config.aggregator.name, &config.aggregator.args)?;
        Ok(Self::new(config, channel, selector, aggregator, store))
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    pub fn round_id(&self) -> RoundId {
        self.state.borrow().round_id
    }

    pub fn pool(&self) -> Vec<WorkerId> {
        self.state.borrow().pool.clone()
    }

    pub fn worker(&self, id: &str) -> Option<WorkerRecord> {
        self.state.borrow().workers.get(id).cloned()
    }

    pub fn best(&self) -> Option<BestModel> {
        self.state.borrow().best.clone()
    }

    pub fn snapshot(&self) -> CoordinatorState {
        self.state.borrow().clone()
    }

    /// Subscribes to the coordinator topics and applies every inbound
    /// message on a background task.
    pub async fn listen(self: &Arc<Self>) -> Result<JoinHandle<()>, CoordinatorError> {
        let mut inbox = self.channel.subscribe(&Topic::coordinator_inbox()).await?;
        let coordinator = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(envelope) = inbox.next().await {
                if let Err(e) = coordinator.dispatch(envelope).await {
                    log::error!("Failed to handle inbound message: {}", e);
                }
            }
            log::debug!("Coordinator inbox closed");
        }))
    }

    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), CoordinatorError> {
        match envelope.payload {
            Payload::Register(notice) => {
                self.register(notice).await?;
            }
            Payload::Ready(notice) => self.mark_ready(&notice.id),
            Payload::TrainResult(result) => {
                self.submit_train_result(result);
            }
            Payload::EvalMetrics(report) => {
                self.submit_eval_metrics(report);
            }
            other => log::debug!(
                "Coordinator ignoring {} from {}",
                other.topic().as_str(),
                envelope.sender
            ),
        }
        Ok(())
    }

    /// Adds a worker to the pool and sends it the argument update.
    /// Returns `false` for a repeated registration, which changes nothing.
    pub async fn register(&self, notice: RegisterNotice) -> Result<bool, CoordinatorError> {
        if self.state.borrow().is_registered(&notice.id) {
            log::debug!("Worker {} already registered", notice.id);
            return Ok(false);
        }

        self.publish(Payload::ServerArgs(ServerArgs {
            id: notice.id.clone(),
            args: self.config.worker_args.clone(),
        }))
        .await?;

        let id = notice.id.clone();
        let added = self
            .state
            .send_if_modified(|state| state.register(notice.id, notice.accuracy, notice.metrics));
        if added {
            log::info!(
                "Worker {} registered ({} in pool)",
                id,
                self.state.borrow().pool.len()
            );
        }
        Ok(added)
    }

    fn mark_ready(&self, worker: &str) {
        if self.state.send_if_modified(|state| state.mark_ready(worker)) {
            self.events.record(EventTag::Arrival, &[&worker]);
        }
    }

    pub fn submit_train_result(&self, result: TrainResult) -> ResponseOutcome {
        let worker = result.id.clone();
        let round = result.round;
        let success = state::is_usable(&result);

        // The event line is written before waiters observe the new count.
        let mut outcome = ResponseOutcome::Stale;
        self.state.send_if_modified(|state| {
            outcome = state.accept_train(result);
            if outcome == ResponseOutcome::Counted {
                self.events
                    .record(EventTag::Return0, &[&worker, &flag(success)]);
            }
            outcome == ResponseOutcome::Counted
        });

        match outcome {
            ResponseOutcome::Counted => {
                log::debug!("Training result from {} (success: {})", worker, success);
            }
            other => log::warn!(
                "Ignoring training result from {} for round {}: {:?}",
                worker,
                round,
                other
            ),
        }
        outcome
    }

    pub fn submit_eval_metrics(&self, report: EvalReport) -> ResponseOutcome {
        let worker = report.id.clone();
        let round = report.round;

        let mut outcome = ResponseOutcome::Stale;
        self.state.send_if_modified(|state| {
            outcome = state.accept_eval(report);
            if outcome == ResponseOutcome::Counted {
                self.events.record(EventTag::Return1, &[&worker]);
            }
            outcome == ResponseOutcome::Counted
        });

        match outcome {
            ResponseOutcome::Counted => {
                log::debug!("Evaluation metrics from {}", worker);
            }
            other => log::warn!(
                "Ignoring evaluation metrics from {} for round {}: {:?}",
                worker,
                round,
                other
            ),
        }
        outcome
    }

    /// INIT: blocks until `min_workers` have registered.
    pub async fn wait_for_workers(&self) -> Result<(), CoordinatorError> {
        self.expect_phase(&[Phase::Init])?;
        self.events.mark(EventTag::InitExperiment);
        self.events.mark(EventTag::ArrivalStart);

        let required = self.config.min_workers;
        let timeout = self.config.registration_timeout();
        log::info!("Waiting for {} workers", required);

        let reached = self
            .wait_until(timeout, move |state| state.pool.len() >= required)
            .await;
        let registered = self.state.borrow().pool.len();
        if !reached {
            return Err(CoordinatorError::RegistrationTimeout {
                registered,
                required,
                waited: timeout.unwrap_or_default(),
            });
        }

        self.events
            .record(EventTag::ArrivalEnd, &[&required, &registered]);
        self.state.send_modify(|state| state.phase = Phase::Select);
        log::info!("{} workers registered, starting rounds", registered);
        Ok(())
    }

    /// Runs select, train, aggregate and evaluate for the next round.
    pub async fn run_round(&self) -> Result<RoundReport, CoordinatorError> {
        let round_id = {
            let state = self.state.borrow();
            let ready = match state.phase {
                Phase::Select => state.round.is_none(),
                Phase::Decide => state.decided == Some(state.round_id),
                _ => false,
            };
            if !ready {
                return Err(CoordinatorError::InvalidPhase {
                    phase: state.phase,
                    round: state.round_id,
                });
            }
            state.round_id + 1
        };

        log::info!("Starting round {}", round_id);
        self.events.record(EventTag::StartRound, &[&round_id]);

        // Select
        self.events.mark(EventTag::SelectStart);
        let (participants, selected) = self.select(round_id).await?;
        self.state.send_modify(|state| {
            let mut round = Round::new(round_id, participants.clone(), selected.clone());
            round.begin_phase(Phase::Select);
            state.start_round(round);
        });

        for worker in &participants {
            let chosen = selected.contains(worker);
            self.publish(Payload::Selection(SelectionNotice {
                id: worker.clone(),
                round: round_id,
                selected: chosen,
            }))
            .await?;
            self.events.record(EventTag::Select, &[worker, &flag(chosen)]);
        }
        self.events.record(EventTag::SelectEnd, &[&selected.len()]);
        log::info!(
            "Round {}: selected {} of {} workers",
            round_id,
            selected.len(),
            participants.len()
        );

        // Await training results
        self.state
            .send_modify(|state| state.enter_phase(Phase::AwaitTrain));
        self.events.mark(EventTag::Return0Start);
        let mut non_responsive = Vec::new();
        if !self
            .wait_until(self.config.response_timeout(), CoordinatorState::train_complete)
            .await
        {
            non_responsive.extend(self.expire(round_id, Round::missing_train, "training"));
        }
        let trained_count = self.current_round(|round| round.train_results.len());
        self.events.record(EventTag::Return0End, &[&trained_count]);

        // Aggregate
        self.state
            .send_modify(|state| state.enter_phase(Phase::Aggregate));
        self.events.mark(EventTag::AggregStart);
        let global = self.aggregate(round_id)?;
        self.events.mark(EventTag::AggregEnd);

        // Without a model there is nothing to publish or evaluate.
        if let Some(global) = global {
            let per_worker: BTreeMap<WorkerId, _> = participants
                .iter()
                .map(|id| (id.clone(), global.weights.clone()))
                .collect();
            let message = AggregatedModel {
                round: round_id,
                global: global.clone(),
                per_worker,
            };
            self.state.send_modify(|state| state.global = Some(global));
            self.events.mark(EventTag::Send);
            self.publish(Payload::AggregatedModel(message)).await?;

            // Await evaluation metrics
            self.state
                .send_modify(|state| state.enter_phase(Phase::AwaitEval));
            self.events.mark(EventTag::Return1Start);
            if !self
                .wait_until(self.config.response_timeout(), CoordinatorState::eval_complete)
                .await
            {
                for worker in self.expire(round_id, Round::missing_eval, "evaluation") {
                    if !non_responsive.contains(&worker) {
                        non_responsive.push(worker);
                    }
                }
            }
            let evaluated_count = self.current_round(|round| round.eval_reports.len());
            self.events.record(EventTag::Return1End, &[&evaluated_count]);
        }

        let mut report = None;
        self.state.send_modify(|state| {
            state.enter_phase(Phase::Decide);
            if let Some(round) = state.round.as_mut() {
                round.mean_accuracy = round.compute_mean_accuracy();
                report = Some(RoundReport {
                    round: round.id,
                    selected: round.selected.clone(),
                    participants: round.participants.clone(),
                    trained: round.contributions().into_iter().map(|c| c.worker).collect(),
                    failed: round.failed_workers(),
                    non_responsive: non_responsive.clone(),
                    mean_accuracy: round.mean_accuracy,
                    duration_secs: round.elapsed_secs(),
                });
            }
        });

        let report = report.ok_or(CoordinatorError::InvalidPhase {
            phase: Phase::Decide,
            round: round_id,
        })?;
        match report.mean_accuracy {
            Some(accuracy) => log::info!("Round {} mean accuracy {:.4}", round_id, accuracy),
            None => log::warn!("Round {} produced no accuracy reports", round_id),
        }
        Ok(report)
    }

    /// Compares the round's mean accuracy with the stop threshold and the
    /// round cap. A stop outcome persists the best model and broadcasts stop.
    pub async fn decide(&self) -> Result<Decision, CoordinatorError> {
        let (round_id, mean_accuracy, global) = {
            let state = self.state.borrow();
            if state.decided == Some(state.round_id) && state.round_id > 0 {
                return Err(CoordinatorError::AlreadyDecided(state.round_id));
            }
            if state.phase != Phase::Decide {
                return Err(CoordinatorError::InvalidPhase {
                    phase: state.phase,
                    round: state.round_id,
                });
            }
            (
                state.round_id,
                state.round.as_ref().and_then(|round| round.mean_accuracy),
                state.global.clone(),
            )
        };

        self.events.mark(EventTag::ComputeStart);
        self.events.mark(EventTag::SaveStart);

        let mut best = None;
        self.state.send_modify(|state| {
            state.decided = Some(round_id);
            if let (Some(accuracy), Some(global)) = (mean_accuracy, global) {
                let improved = state
                    .best
                    .as_ref()
                    .map_or(true, |best| best.is_improved_by(accuracy));
                if improved {
                    state.best = Some(BestModel {
                        round: round_id,
                        accuracy,
                        weights: global.weights,
                    });
                }
            }
            best = state.best.clone();
        });

        let decision = match mean_accuracy {
            Some(accuracy) if accuracy >= self.config.stop_accuracy => Decision::StopAccuracy,
            _ if round_id >= self.config.max_rounds => Decision::StopRounds,
            _ => Decision::Continue,
        };

        if decision.is_stop() {
            self.persist(best.as_ref()).await?;
        }
        self.events.mark(EventTag::SaveEnd);

        if decision.is_stop() {
            log::info!("Stop condition: {}", decision.as_str());
            self.publish(Payload::Stop(StopNotice { stop: true })).await?;
            self.state
                .send_modify(|state| state.enter_phase(Phase::Terminated));
        }
        self.events.mark(EventTag::ComputeEnd);

        let duration = self.current_round(Round::elapsed_secs);
        self.state
            .send_modify(|state| state.round_durations.push(duration));
        self.events.record(EventTag::RoundDuration, &[&duration]);
        self.events.record(EventTag::EndRound, &[&round_id]);

        if !decision.is_stop() {
            self.log_remaining(round_id);
        }
        Ok(decision)
    }

    /// Listens for inbound messages and drives the experiment to its end.
    pub async fn run(self: Arc<Self>) -> Result<ExperimentSummary, CoordinatorError> {
        let dispatcher = self.listen().await?;
        let result = self.run_rounds().await;
        dispatcher.abort();
        result
    }

    /// Drives INIT and the round cycle until a stop decision. Inbound
    /// messages must already be flowing, see [`Coordinator::listen`].
    pub async fn run_rounds(&self) -> Result<ExperimentSummary, CoordinatorError> {
        self.wait_for_workers().await?;
        let mut rounds = Vec::new();
        loop {
            rounds.push(self.run_round().await?);
            let decision = self.decide().await?;
            if decision.is_stop() {
                return Ok(ExperimentSummary {
                    rounds,
                    decision,
                    best: self.best(),
                });
            }
        }
    }

    async fn select(
        &self,
        round_id: RoundId,
    ) -> Result<(Vec<WorkerId>, Vec<WorkerId>), CoordinatorError> {
        let mut attempts = 0;
        loop {
            let pool = self.pool();
            if pool.is_empty() {
                log::error!("Worker pool is empty at the start of round {}", round_id);
            } else {
                let members: HashSet<&WorkerId> = pool.iter().collect();
                let mut seen = HashSet::new();
                let selected: Vec<WorkerId> = self
                    .selector
                    .select(&pool, round_id)
                    .into_iter()
                    .filter(|id| {
                        if !members.contains(id) {
                            log::warn!("Selector returned unknown worker {}", id);
                            return false;
                        }
                        seen.insert(id.clone())
                    })
                    .collect();
                if !selected.is_empty() {
                    return Ok((pool, selected));
                }
                log::error!(
                    "Selector '{}' chose no workers for round {}",
                    self.selector.name(),
                    round_id
                );
            }

            attempts += 1;
            if attempts > self.config.max_empty_selection_retries {
                return Err(CoordinatorError::EmptySelection {
                    round: round_id,
                    attempts,
                });
            }
            tokio::time::sleep(self.config.empty_selection_retry()).await;
        }
    }

    /// Folds the round's contributions into a new global model. A round with
    /// no usable training falls back to the previous model, or to `None` when
    /// there has never been one.
    fn aggregate(&self, round_id: RoundId) -> Result<Option<ModelEntry>, CoordinatorError> {
        let (contributions, previous) = {
            let state = self.state.borrow();
            let contributions = state
                .round
                .as_ref()
                .map(Round::contributions)
                .unwrap_or_default();
            (contributions, state.global.clone())
        };

        if contributions.is_empty() {
            match &previous {
                Some(_) => log::warn!(
                    "No successful training in round {}, keeping the previous model",
                    round_id
                ),
                None => log::warn!(
                    "No successful training in round {} and no previous model, skipping evaluation",
                    round_id
                ),
            }
            return Ok(previous);
        }

        let weights = self
            .aggregator
            .aggregate(&contributions)
            .map_err(|e| CoordinatorError::Aggregation {
                round: round_id,
                message: e.to_string(),
            })?;
        log::debug!(
            "Aggregated {} contributions with '{}'",
            contributions.len(),
            self.aggregator.name()
        );
        Ok(Some(ModelEntry {
            weights,
            extra: self.aggregator.extra_info(),
        }))
    }

    async fn persist(&self, best: Option<&BestModel>) -> Result<(), CoordinatorError> {
        if self.state.borrow().persisted {
            return Ok(());
        }
        let Some(best) = best else {
            log::warn!("No evaluated model to persist");
            return Ok(());
        };
        self.store.save_best(best).await?;
        self.state.send_modify(|state| state.persisted = true);
        log::info!(
            "Persisted best model from round {} (accuracy {:.4})",
            best.round,
            best.accuracy
        );
        Ok(())
    }

    fn expire(
        &self,
        round_id: RoundId,
        missing: fn(&Round) -> Vec<WorkerId>,
        leg: &str,
    ) -> Vec<WorkerId> {
        let mut expired = Vec::new();
        self.state.send_modify(|state| {
            expired = state.round.as_ref().map(missing).unwrap_or_default();
            state.mark_non_responsive(&expired);
        });
        log::warn!(
            "Round {}: {} response timeout, no answer from {:?}",
            round_id,
            leg,
            expired
        );
        expired
    }

    fn log_remaining(&self, round_id: RoundId) {
        let state = self.state.borrow();
        if state.round_durations.is_empty() {
            return;
        }
        let mean = state.round_durations.iter().sum::<f64>() / state.round_durations.len() as f64;
        let remaining = self.config.max_rounds.saturating_sub(round_id);
        log::info!(
            "Round {} done, at most {} rounds left (~{:.1}s)",
            round_id,
            remaining,
            mean * remaining as f64
        );
    }

    fn current_round<T: Default>(&self, read: impl FnOnce(&Round) -> T) -> T {
        self.state.borrow().round.as_ref().map(read).unwrap_or_default()
    }

    fn expect_phase(&self, allowed: &[Phase]) -> Result<(), CoordinatorError> {
        let state = self.state.borrow();
        if allowed.contains(&state.phase) {
            Ok(())
        } else {
            Err(CoordinatorError::InvalidPhase {
                phase: state.phase,
                round: state.round_id,
            })
        }
    }

    /// Waits until `done` holds. Returns false if `timeout` elapsed first.
    async fn wait_until<F>(&self, timeout: Option<Duration>, done: F) -> bool
    where
        F: FnMut(&CoordinatorState) -> bool + Send,
    {
        let mut rx = self.state.subscribe();
        let wait = async move {
            let reached = rx.wait_for(done).await.is_ok();
            reached
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or(false),
            None => wait.await,
        }
    }

    async fn publish(&self, payload: Payload) -> Result<(), CoordinatorError> {
        let envelope = Envelope::new(COORDINATOR_ID, payload);
        publish_with_retry(self.channel.as_ref(), envelope, &self.retry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{AllSelector, MeanAggregator};
    use crate::channel::MemoryBus;
    use crate::storage::MemoryModelStore;
    use crate::types::Metrics;

    fn coordinator(config: CoordinatorConfig) -> (Coordinator, MemoryBus, Arc<MemoryModelStore>) {
        let bus = MemoryBus::with_history();
        let store = Arc::new(MemoryModelStore::new());
        let coordinator = Coordinator::new(
            config,
            Arc::new(bus.clone()),
            Box::new(AllSelector),
            Box::new(MeanAggregator),
            store.clone(),
        );
        (coordinator, bus, store)
    }

    fn notice(id: &str) -> RegisterNotice {
        RegisterNotice {
            id: id.to_string(),
            accuracy: Some(0.1),
            metrics: Metrics::new(),
        }
    }

    #[tokio::test]
    async fn test_register_sends_arguments_once() {
        let config = CoordinatorConfig {
            worker_args: Some(serde_json::json!({"learning_rate": 0.2})),
            ..Default::default()
        };
        let (coordinator, bus, _) = coordinator(config);

        assert!(coordinator.register(notice("a")).await.unwrap());
        assert!(!coordinator.register(notice("a")).await.unwrap());

        assert_eq!(coordinator.pool(), vec!["a".to_string()]);
        assert_eq!(bus.published_on(Topic::ServerArgs).len(), 1);
    }

    #[tokio::test]
    async fn test_phase_guards() {
        let (coordinator, _, _) = coordinator(CoordinatorConfig::default());
        assert!(matches!(
            coordinator.run_round().await,
            Err(CoordinatorError::InvalidPhase { phase: Phase::Init, .. })
        ));
        assert!(matches!(
            coordinator.decide().await,
            Err(CoordinatorError::InvalidPhase { .. })
        ));
    }

    #[tokio::test]
    async fn test_registration_timeout() {
        let config = CoordinatorConfig {
            min_workers: 2,
            registration_timeout_secs: Some(0.05),
            ..Default::default()
        };
        let (coordinator, _, _) = coordinator(config);
        coordinator.register(notice("a")).await.unwrap();

        let err = coordinator.wait_for_workers().await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::RegistrationTimeout {
                registered: 1,
                required: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_for_workers_wakes_on_registration() {
        let config = CoordinatorConfig {
            min_workers: 2,
            ..Default::default()
        };
        let (coordinator, _, _) = coordinator(config);
        let coordinator = Arc::new(coordinator);

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.wait_for_workers().await })
        };
        coordinator.register(notice("a")).await.unwrap();
        coordinator.register(notice("b")).await.unwrap();

        waiter.await.unwrap().unwrap();
        assert_eq!(coordinator.phase(), Phase::Select);
    }

    #[tokio::test]
    async fn test_empty_pool_gives_up_after_retries() {
        let config = CoordinatorConfig {
            min_workers: 1,
            empty_selection_retry_ms: 1,
            max_empty_selection_retries: 2,
            ..Default::default()
        };
        let (coordinator, _, _) = coordinator(config);
        coordinator.state.send_modify(|state| state.phase = Phase::Select);

        let err = coordinator.run_round().await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::EmptySelection {
                round: 1,
                attempts: 3
            }
        ));
    }
}
