use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::types::{EventRecord, EventTag, RoundId};

/// Every event one log recorded between a round's start and end markers.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundEvents {
    pub round: RoundId,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub records: Vec<EventRecord>,
}

impl RoundEvents {
    fn new(round: RoundId, start: NaiveDateTime) -> Self {
        Self {
            round,
            start,
            end: None,
            records: Vec::new(),
        }
    }

    pub fn first(&self, tag: EventTag) -> Option<&EventRecord> {
        self.records.iter().find(|record| record.tag == tag)
    }

    pub fn at(&self, tag: EventTag) -> Option<NaiveDateTime> {
        self.first(tag).map(|record| record.timestamp)
    }

    /// First `tag` record whose leading extra names `worker`.
    pub fn for_worker(&self, tag: EventTag, worker: &str) -> Option<&EventRecord> {
        self.records
            .iter()
            .find(|record| record.tag == tag && record.extra(0) == Some(worker))
    }
}

/// One log's events grouped by round.
///
/// START_ROUND opens a round and END_ROUND closes it; a START_ROUND while a
/// round is still open closes the open one without an end time. Events outside
/// any round land in `outside`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub rounds: BTreeMap<RoundId, RoundEvents>,
    pub outside: Vec<EventRecord>,
}

impl Timeline {
    pub fn from_records(records: impl IntoIterator<Item = EventRecord>) -> Self {
        let mut timeline = Timeline::default();
        let mut open: Option<RoundEvents> = None;
        let mut last_round: RoundId = 0;

        for record in records {
            match record.tag {
                EventTag::StartRound => {
                    if let Some(round) = open.take() {
                        log::debug!("Round {} has no END_ROUND marker", round.round);
                        timeline.close(round);
                    }
                    let id = record.extra_u64(0).unwrap_or(last_round + 1);
                    last_round = id;
                    open = Some(RoundEvents::new(id, record.timestamp));
                }
                EventTag::EndRound => match open.take() {
                    Some(mut round) => {
                        round.end = Some(record.timestamp);
                        timeline.close(round);
                    }
                    None => timeline.outside.push(record),
                },
                _ => match open.as_mut() {
                    Some(round) => round.records.push(record),
                    None => timeline.outside.push(record),
                },
            }
        }

        if let Some(round) = open {
            timeline.close(round);
        }
        timeline
    }

    pub fn round(&self, id: RoundId) -> Option<&RoundEvents> {
        self.rounds.get(&id)
    }

    /// First event with `tag` outside any round.
    pub fn outside_first(&self, tag: EventTag) -> Option<&EventRecord> {
        self.outside.iter().find(|record| record.tag == tag)
    }

    fn close(&mut self, round: RoundEvents) {
        if self.rounds.contains_key(&round.round) {
            log::warn!("Round {} appears twice, keeping the first", round.round);
            return;
        }
        self.rounds.insert(round.round, round);
    }
}

/// Absolute distance between two timestamps in microseconds.
pub fn span_micros(a: NaiveDateTime, b: NaiveDateTime) -> Option<i64> {
    (b - a).num_microseconds().map(i64::abs)
}

pub fn micros_to_secs(micros: i64) -> f64 {
    micros as f64 / 1_000_000.0
}

pub fn secs_to_micros(secs: f64) -> Option<i64> {
    secs.is_finite().then(|| (secs * 1_000_000.0).round() as i64)
}
