use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDateTime;

use super::timeline::{micros_to_secs, secs_to_micros, span_micros, RoundEvents, Timeline};
use crate::types::event::{flag, TIMESTAMP_FORMAT};
use crate::types::{EventTag, RoundId, WorkerId};

pub const SERVER_COLUMNS: [&str; 7] = [
    "ROUND",
    "ROUND_DURATION",
    "T_SELECT",
    "T_RETURN",
    "T_AGGREG",
    "T_SAVE",
    "T_COMPUTE",
];

pub const CLIENT_COLUMNS: [&str; 9] = [
    "ROUND",
    "CLIENT_ID",
    "ROUND_DURATION",
    "T_SELECT",
    "SELECTED",
    "T_SEND",
    "T_TRAIN",
    "TRAINED",
    "T_RETURN",
];

/// Per-round durations seen by the coordinator, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRow {
    pub round: RoundId,
    pub round_duration: Option<f64>,
    pub t_select: Option<f64>,
    /// Both response legs added together.
    pub t_return: Option<f64>,
    pub t_aggreg: Option<f64>,
    pub t_save: Option<f64>,
    /// Round duration minus every instrumented phase.
    pub t_compute: Option<f64>,
}

/// Per-round, per-worker latencies. Cross-log values are raw differences
/// between two unsynchronized clocks.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRow {
    pub round: RoundId,
    pub client_id: WorkerId,
    pub round_duration: Option<f64>,
    pub t_select: Option<f64>,
    pub selected: Option<bool>,
    pub t_send: Option<f64>,
    pub t_train: Option<f64>,
    pub trained: Option<bool>,
    /// Mean of the available return legs.
    pub t_return: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrivalSummary {
    pub min_workers: Option<u64>,
    pub registered: Option<u64>,
    pub arrivals: BTreeMap<WorkerId, NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceReport {
    pub server: Vec<ServerRow>,
    pub clients: Vec<ClientRow>,
    pub arrivals: ArrivalSummary,
}

impl TraceReport {
    pub fn build(coordinator: &Timeline, workers: &BTreeMap<WorkerId, Timeline>) -> Self {
        let server = coordinator.rounds.values().map(server_row).collect();

        let mut clients = Vec::new();
        for (worker, timeline) in workers {
            for round in timeline.rounds.values() {
                clients.push(client_row(worker, round, coordinator.round(round.round)));
            }
        }
        clients.sort_by(|a: &ClientRow, b: &ClientRow| {
            (a.round, &a.client_id).cmp(&(b.round, &b.client_id))
        });

        Self {
            server,
            clients,
            arrivals: arrival_summary(coordinator),
        }
    }

    pub fn server_csv(&self) -> String {
        let mut out = SERVER_COLUMNS.join(",");
        out.push('\n');
        for row in &self.server {
            let cells = [
                row.round.to_string(),
                cell(row.round_duration),
                cell(row.t_select),
                cell(row.t_return),
                cell(row.t_aggreg),
                cell(row.t_save),
                cell(row.t_compute),
            ];
            let _ = writeln!(out, "{}", cells.join(","));
        }
        out
    }

    pub fn clients_csv(&self) -> String {
        let mut out = CLIENT_COLUMNS.join(",");
        out.push('\n');
        for row in &self.clients {
            let cells = [
                row.round.to_string(),
                row.client_id.clone(),
                cell(row.round_duration),
                cell(row.t_select),
                row.selected.map(flag).unwrap_or_default().to_string(),
                cell(row.t_send),
                cell(row.t_train),
                row.trained.map(flag).unwrap_or_default().to_string(),
                cell(row.t_return),
            ];
            let _ = writeln!(out, "{}", cells.join(","));
        }
        out
    }

    pub fn arrivals_csv(&self) -> String {
        let mut out = String::from("CLIENT_ID,T_ARRIVAL\n");
        for (worker, at) in &self.arrivals.arrivals {
            let _ = writeln!(out, "{},{}", worker, at.format(TIMESTAMP_FORMAT));
        }
        out
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn phase_micros(round: &RoundEvents, start: EventTag, end: EventTag) -> Option<i64> {
    span_micros(round.at(start)?, round.at(end)?)
}

fn server_row(round: &RoundEvents) -> ServerRow {
    let duration = round
        .first(EventTag::RoundDuration)
        .and_then(|record| record.extra_f64(0))
        .and_then(secs_to_micros)
        .or_else(|| span_micros(round.start, round.end?));
    let select = phase_micros(round, EventTag::SelectStart, EventTag::SelectEnd);
    let returns = phase_micros(round, EventTag::Return0Start, EventTag::Return0End)
        .zip(phase_micros(round, EventTag::Return1Start, EventTag::Return1End))
        .map(|(train, eval)| train + eval);
    let aggreg = phase_micros(round, EventTag::AggregStart, EventTag::AggregEnd);
    let save = phase_micros(round, EventTag::SaveStart, EventTag::SaveEnd);
    let compute = (|| Some(duration? - select? - returns? - aggreg? - save?))();

    ServerRow {
        round: round.round,
        round_duration: duration.map(micros_to_secs),
        t_select: select.map(micros_to_secs),
        t_return: returns.map(micros_to_secs),
        t_aggreg: aggreg.map(micros_to_secs),
        t_save: save.map(micros_to_secs),
        t_compute: compute.map(micros_to_secs),
    }
}

fn client_row(worker: &str, round: &RoundEvents, coordinator: Option<&RoundEvents>) -> ClientRow {
    let seen_by_coordinator = |tag: EventTag| {
        coordinator
            .and_then(|c| c.for_worker(tag, worker))
            .map(|record| record.timestamp)
    };
    let leg = |tag: EventTag| span_micros(round.at(tag)?, seen_by_coordinator(tag)?);

    let select = round.first(EventTag::Select);
    let train = round.first(EventTag::Train);
    let send = round
        .at(EventTag::Send)
        .zip(coordinator.and_then(|c| c.at(EventTag::Send)))
        .and_then(|(w, c)| span_micros(w, c));

    let legs: Vec<i64> = [leg(EventTag::Return0), leg(EventTag::Return1)]
        .into_iter()
        .flatten()
        .collect();
    let t_return = (!legs.is_empty())
        .then(|| legs.iter().sum::<i64>() as f64 / legs.len() as f64 / 1_000_000.0);

    ClientRow {
        round: round.round,
        client_id: worker.to_string(),
        round_duration: round
            .end
            .and_then(|end| span_micros(round.start, end))
            .map(micros_to_secs),
        t_select: leg(EventTag::Select).map(micros_to_secs),
        selected: select.and_then(|record| record.extra_bool(0)),
        t_send: send.map(micros_to_secs),
        t_train: train.and_then(|record| record.extra_f64(1)),
        trained: train.and_then(|record| record.extra_bool(0)),
        t_return,
    }
}

fn arrival_summary(coordinator: &Timeline) -> ArrivalSummary {
    let mut summary = ArrivalSummary::default();
    if let Some(end) = coordinator.outside_first(EventTag::ArrivalEnd) {
        summary.min_workers = end.extra_u64(0);
        summary.registered = end.extra_u64(1);
    }

    let arrivals = coordinator
        .outside
        .iter()
        .chain(coordinator.rounds.values().flat_map(|round| round.records.iter()))
        .filter(|record| record.tag == EventTag::Arrival);
    for record in arrivals {
        if let Some(worker) = record.extra(0) {
            summary
                .arrivals
                .entry(worker.to_string())
                .or_insert(record.timestamp);
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventRecord;
    use chrono::NaiveDate;

    fn record(ms: i64, tag: EventTag, extras: &[&str]) -> EventRecord {
        EventRecord {
            timestamp: NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
                + chrono::Duration::milliseconds(ms),
            tag,
            extras: extras.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn test_server_row_falls_back_to_markers() {
        let timeline = Timeline::from_records(vec![
            record(0, EventTag::StartRound, &["1"]),
            record(100, EventTag::SelectStart, &[]),
            record(300, EventTag::SelectEnd, &["1"]),
            record(1000, EventTag::EndRound, &["1"]),
        ]);
        let row = server_row(timeline.round(1).unwrap());
        assert_eq!(row.round_duration, Some(1.0));
        assert_eq!(row.t_select, Some(0.2));
        assert_eq!(row.t_return, None);
        assert_eq!(row.t_compute, None);
    }

    #[test]
    fn test_unselected_worker_has_single_leg() {
        let coordinator = Timeline::from_records(vec![
            record(0, EventTag::StartRound, &["1"]),
            record(10, EventTag::Select, &["b", "False"]),
            record(500, EventTag::Send, &[]),
            record(900, EventTag::Return1, &["b"]),
            record(1000, EventTag::EndRound, &["1"]),
        ]);
        let worker = Timeline::from_records(vec![
            record(20, EventTag::StartRound, &["1"]),
            record(30, EventTag::Select, &["False"]),
            record(540, EventTag::Send, &[]),
            record(800, EventTag::Return1, &[]),
            record(810, EventTag::EndRound, &["1"]),
        ]);

        let row = client_row("b", worker.round(1).unwrap(), coordinator.round(1));
        assert_eq!(row.round_duration, Some(0.79));
        assert_eq!(row.t_select, Some(0.02));
        assert_eq!(row.selected, Some(false));
        assert_eq!(row.t_send, Some(0.04));
        assert_eq!(row.t_train, None);
        assert_eq!(row.trained, None);
        assert_eq!(row.t_return, Some(0.1));
    }

    #[test]
    fn test_csv_leaves_absent_values_empty() {
        let report = TraceReport {
            server: vec![ServerRow {
                round: 1,
                round_duration: Some(2.5),
                t_select: None,
                t_return: Some(1.0),
                t_aggreg: Some(0.25),
                t_save: None,
                t_compute: None,
            }],
            clients: vec![ClientRow {
                round: 1,
                client_id: "sta1".to_string(),
                round_duration: Some(2.0),
                t_select: Some(0.01),
                selected: Some(true),
                t_send: None,
                t_train: Some(1.5),
                trained: Some(false),
                t_return: None,
            }],
            arrivals: ArrivalSummary::default(),
        };

        assert_eq!(
            report.server_csv(),
            "ROUND,ROUND_DURATION,T_SELECT,T_RETURN,T_AGGREG,T_SAVE,T_COMPUTE\n1,2.5,,1,0.25,,\n"
        );
        assert_eq!(
            report.clients_csv().lines().nth(1),
            Some("1,sta1,2,0.01,True,,1.5,False,")
        );
    }

    #[test]
    fn test_arrival_summary() {
        let coordinator = Timeline::from_records(vec![
            record(0, EventTag::InitExperiment, &[]),
            record(5, EventTag::ArrivalStart, &[]),
            record(20, EventTag::Arrival, &["sta2"]),
            record(30, EventTag::Arrival, &["sta1"]),
            record(35, EventTag::ArrivalEnd, &["2", "2"]),
            record(40, EventTag::StartRound, &["1"]),
            record(50, EventTag::Arrival, &["sta3"]),
            record(60, EventTag::Arrival, &["sta1"]),
        ]);
        let summary = arrival_summary(&coordinator);
        assert_eq!(summary.min_workers, Some(2));
        assert_eq!(summary.registered, Some(2));
        assert_eq!(summary.arrivals.len(), 3);
        assert_eq!(summary.arrivals["sta1"], record(30, EventTag::Arrival, &[]).timestamp);
    }
}
