use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp layout of every event line, local clock with milliseconds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Separator between the timestamp and the tag.
pub const FIELD_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventTag {
    InitExperiment,
    Arrival,
    ArrivalStart,
    ArrivalEnd,
    StartRound,
    EndRound,
    RoundDuration,
    SelectStart,
    Select,
    SelectEnd,
    Return0Start,
    Return0,
    Return0End,
    Train,
    AggregStart,
    AggregEnd,
    Send,
    Return1Start,
    Return1,
    Return1End,
    ComputeStart,
    ComputeEnd,
    SaveStart,
    SaveEnd,
}

impl EventTag {
    pub const ALL: [EventTag; 24] = [
        EventTag::InitExperiment,
        EventTag::Arrival,
        EventTag::ArrivalStart,
        EventTag::ArrivalEnd,
        EventTag::StartRound,
        EventTag::EndRound,
        EventTag::RoundDuration,
        EventTag::SelectStart,
        EventTag::Select,
        EventTag::SelectEnd,
        EventTag::Return0Start,
        EventTag::Return0,
        EventTag::Return0End,
        EventTag::Train,
        EventTag::AggregStart,
        EventTag::AggregEnd,
        EventTag::Send,
        EventTag::Return1Start,
        EventTag::Return1,
        EventTag::Return1End,
        EventTag::ComputeStart,
        EventTag::ComputeEnd,
        EventTag::SaveStart,
        EventTag::SaveEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::InitExperiment => "INIT_EXPERIMENT",
            EventTag::Arrival => "T_ARRIVAL",
            EventTag::ArrivalStart => "T_ARRIVAL_START",
            EventTag::ArrivalEnd => "T_ARRIVAL_END",
            EventTag::StartRound => "START_ROUND",
            EventTag::EndRound => "END_ROUND",
            EventTag::RoundDuration => "ROUND_DURATION",
            EventTag::SelectStart => "T_SELECT_START",
            EventTag::Select => "T_SELECT",
            EventTag::SelectEnd => "T_SELECT_END",
            EventTag::Return0Start => "T_RETURN_0_START",
            EventTag::Return0 => "T_RETURN_0",
            EventTag::Return0End => "T_RETURN_0_END",
            EventTag::Train => "T_TRAIN",
            EventTag::AggregStart => "T_AGGREG_START",
            EventTag::AggregEnd => "T_AGGREG_END",
            EventTag::Send => "T_SEND",
            EventTag::Return1Start => "T_RETURN_1_START",
            EventTag::Return1 => "T_RETURN_1",
            EventTag::Return1End => "T_RETURN_1_END",
            EventTag::ComputeStart => "T_COMPUTE_START",
            EventTag::ComputeEnd => "T_COMPUTE_END",
            EventTag::SaveStart => "T_SAVE_START",
            EventTag::SaveEnd => "T_SAVE_END",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl FromStr for EventTag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventTag::ALL
            .iter()
            .find(|tag| tag.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// One parsed line of an event log. The timestamp is local to the process
/// that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub timestamp: NaiveDateTime,
    pub tag: EventTag,
    pub extras: Vec<String>,
}

impl EventRecord {
    pub fn extra(&self, index: usize) -> Option<&str> {
        self.extras.get(index).map(String::as_str)
    }

    pub fn extra_f64(&self, index: usize) -> Option<f64> {
        self.extra(index).and_then(|v| v.parse().ok())
    }

    pub fn extra_u64(&self, index: usize) -> Option<u64> {
        self.extra(index).and_then(|v| v.parse().ok())
    }

    /// Boolean extras are written as `True`/`False`.
    pub fn extra_bool(&self, index: usize) -> Option<bool> {
        match self.extra(index)? {
            "True" | "true" => Some(true),
            "False" | "false" => Some(false),
            _ => None,
        }
    }
}

/// Formats a boolean the way event extras expect it.
pub fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
