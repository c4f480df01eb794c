use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Metrics, RoundId, Weights, WorkerId};
use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Register,
    Ready,
    ServerArgs,
    Selection,
    TrainResult,
    AggregatedModel,
    EvalMetrics,
    Stop,
}

impl Topic {
    pub fn as_str(&self) -> &str {
        match self {
            Topic::Register => "minifed/registerQueue",
            Topic::Ready => "minifed/ready",
            Topic::ServerArgs => "minifed/serverArgs",
            Topic::Selection => "minifed/selectionQueue",
            Topic::TrainResult => "minifed/preAggQueue",
            Topic::AggregatedModel => "minifed/posAggQueue",
            Topic::EvalMetrics => "minifed/metricsQueue",
            Topic::Stop => "minifed/stopQueue",
        }
    }

    /// Topics a coordinator listens on.
    pub fn coordinator_inbox() -> [Topic; 4] {
        [
            Topic::Register,
            Topic::Ready,
            Topic::TrainResult,
            Topic::EvalMetrics,
        ]
    }

    /// Topics a worker listens on.
    pub fn worker_inbox() -> [Topic; 4] {
        [
            Topic::ServerArgs,
            Topic::Selection,
            Topic::AggregatedModel,
            Topic::Stop,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterNotice {
    pub id: WorkerId,
    pub accuracy: Option<f64>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyNotice {
    pub id: WorkerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerArgs {
    pub id: WorkerId,
    pub args: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionNotice {
    pub id: WorkerId,
    pub round: RoundId,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainResult {
    pub id: WorkerId,
    pub round: RoundId,
    pub success: bool,
    pub weights: Option<Weights>,
    pub sample_count: Option<u64>,
    pub training_args: Option<Value>,
    pub train_secs: f64,
}

impl TrainResult {
    pub fn succeeded(
        id: impl Into<WorkerId>,
        round: RoundId,
        weights: Weights,
        sample_count: u64,
    ) -> Self {
        Self {
            id: id.into(),
            round,
            success: true,
            weights: Some(weights),
            sample_count: Some(sample_count),
            training_args: None,
            train_secs: 0.0,
        }
    }

    pub fn failed(id: impl Into<WorkerId>, round: RoundId) -> Self {
        Self {
            id: id.into(),
            round,
            success: false,
            weights: None,
            sample_count: None,
            training_args: None,
            train_secs: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub weights: Weights,
    pub extra: Option<Value>,
}

/// Aggregation output addressed to every round participant, plus the global entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedModel {
    pub round: RoundId,
    pub global: ModelEntry,
    pub per_worker: BTreeMap<WorkerId, Weights>,
}

impl AggregatedModel {
    pub fn weights_for(&self, worker: &str) -> Option<&Weights> {
        self.per_worker.get(worker)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub id: WorkerId,
    pub round: RoundId,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopNotice {
    pub stop: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Register(RegisterNotice),
    Ready(ReadyNotice),
    ServerArgs(ServerArgs),
    Selection(SelectionNotice),
    TrainResult(TrainResult),
    AggregatedModel(AggregatedModel),
    EvalMetrics(EvalReport),
    Stop(StopNotice),
}

impl Payload {
    pub fn topic(&self) -> Topic {
        match self {
            Payload::Register(_) => Topic::Register,
            Payload::Ready(_) => Topic::Ready,
            Payload::ServerArgs(_) => Topic::ServerArgs,
            Payload::Selection(_) => Topic::Selection,
            Payload::TrainResult(_) => Topic::TrainResult,
            Payload::AggregatedModel(_) => Topic::AggregatedModel,
            Payload::EvalMetrics(_) => Topic::EvalMetrics,
            Payload::Stop(_) => Topic::Stop,
        }
    }

    /// The single worker a coordinator-to-worker payload targets, if any.
    pub fn addressee(&self) -> Option<&str> {
        match self {
            Payload::ServerArgs(m) => Some(&m.id),
            Payload::Selection(m) => Some(&m.id),
            _ => None,
        }
    }

    /// Whether `worker` should act on this payload. Broadcast topics reach
    /// every subscriber, so targeting is enforced here and not by the transport.
    pub fn is_addressed_to(&self, worker: &str) -> bool {
        match self {
            Payload::ServerArgs(_) | Payload::Selection(_) => self.addressee() == Some(worker),
            Payload::AggregatedModel(m) => m.per_worker.contains_key(worker),
            Payload::Stop(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub topic: Topic,
    pub sender: String,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(sender: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: payload.topic(),
            sender: sender.into(),
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Malformed {
            topic: self.topic.as_str().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_json(topic: Topic, raw: &str) -> Result<Self, ChannelError> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| ChannelError::Malformed {
                topic: topic.as_str().to_string(),
                message: e.to_string(),
            })?;

        if envelope.topic != topic || envelope.payload.topic() != topic {
            return Err(ChannelError::Malformed {
                topic: topic.as_str().to_string(),
                message: format!(
                    "payload for '{}' delivered on '{}'",
                    envelope.payload.topic().as_str(),
                    topic.as_str()
                ),
            });
        }

        Ok(envelope)
    }
}
