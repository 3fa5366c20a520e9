use serde::Serialize;
use vigil_core::{
    Action, ClientStatus, ClosedRecord, CounterSnapshot, Decision, InspectionResult, Liveness,
    RecordId, StatusSnapshot, Timestamp,
};

use crate::client::CommandsIssued;

#[derive(Serialize)]
pub struct StatusOutput {
    pub taken_at_ms: u64,
    pub open_records: usize,
    pub store_degraded: bool,
    pub online_clients: usize,
    pub total_clients: usize,
    pub clients: Vec<ClientOutput>,
    pub counters: CounterSnapshot,
}

impl From<&StatusSnapshot> for StatusOutput {
    fn from(status: &StatusSnapshot) -> Self {
        Self {
            taken_at_ms: status.taken_at.as_millis(),
            open_records: status.open_records,
            store_degraded: status.store_degraded,
            online_clients: status
                .clients
                .iter()
                .filter(|c| c.liveness == Liveness::Online)
                .count(),
            total_clients: status.clients.len(),
            clients: status.clients.iter().map(ClientOutput::from).collect(),
            counters: status.counters,
        }
    }
}

#[derive(Serialize)]
pub struct ClientOutput {
    pub client_id: String,
    pub liveness: String,
    pub run_state: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_age_ms: Option<u64>,
}

impl From<&ClientStatus> for ClientOutput {
    fn from(client: &ClientStatus) -> Self {
        Self {
            client_id: client.client_id.to_string(),
            liveness: client.liveness.to_string(),
            run_state: client.run_state.to_string(),
            connected: client.connected,
            process_state: client.process_state.map(|s| s.to_string()),
            heartbeat_age_ms: client.heartbeat_age_ms,
        }
    }
}

#[derive(Serialize)]
pub struct CommandOutput {
    pub action: String,
    pub issued: Vec<String>,
    pub skipped: Vec<String>,
}

impl CommandOutput {
    pub fn new(action: Action, result: &CommandsIssued) -> Self {
        Self {
            action: action.to_string(),
            issued: result.issued.iter().map(ToString::to_string).collect(),
            skipped: result.skipped.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct TriggerOutput {
    pub record_id: u64,
    pub deadline_ms: u64,
}

impl TriggerOutput {
    pub const fn new(record_id: RecordId, deadline: Timestamp) -> Self {
        Self {
            record_id: record_id.value(),
            deadline_ms: deadline.as_millis(),
        }
    }
}

#[derive(Serialize)]
pub struct RecordOutput {
    pub id: u64,
    pub state: String,
    pub decision: String,
    pub trigger_time_ms: u64,
    pub deadline_ms: u64,
    pub closed_time_ms: u64,
    pub results: Vec<ResultOutput>,
    pub missing_clients: Vec<String>,
}

impl From<&ClosedRecord> for RecordOutput {
    fn from(record: &ClosedRecord) -> Self {
        Self {
            id: record.id.value(),
            state: record.state.to_string(),
            decision: record.decision.to_string(),
            trigger_time_ms: record.trigger_time.as_millis(),
            deadline_ms: record.deadline.as_millis(),
            closed_time_ms: record.closed_time.as_millis(),
            results: record.results.iter().map(ResultOutput::from).collect(),
            missing_clients: record
                .missing_clients()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct ResultOutput {
    pub client_id: String,
    pub classification: String,
    pub confidence: f32,
    pub received_time_ms: u64,
}

impl From<&InspectionResult> for ResultOutput {
    fn from(result: &InspectionResult) -> Self {
        Self {
            client_id: result.client_id.to_string(),
            classification: result.classification.to_string(),
            confidence: result.confidence,
            received_time_ms: result.received_time.as_millis(),
        }
    }
}

#[derive(Serialize)]
pub struct RecordsSummary {
    pub total: usize,
    pub passed: usize,
    pub ejected: usize,
    pub timed_out: usize,
}

impl RecordsSummary {
    pub fn of(records: &[ClosedRecord]) -> Self {
        let passed = records
            .iter()
            .filter(|r| r.decision == Decision::Pass)
            .count();
        Self {
            total: records.len(),
            passed,
            ejected: records.len() - passed,
            timed_out: records.iter().filter(|r| r.is_timeout()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{Classification, ClientId, RecordState};

    fn record(id: u64, state: RecordState, decision: Decision, results: usize) -> ClosedRecord {
        let expected = vec![ClientId::new("jetson-1"), ClientId::new("jetson-2")];
        ClosedRecord {
            id: RecordId::new(id),
            trigger_time: Timestamp::from_millis(1_000),
            deadline: Timestamp::from_millis(6_000),
            expected_clients: expected.clone(),
            results: expected
                .into_iter()
                .take(results)
                .map(|c| {
                    InspectionResult::new(
                        c,
                        Classification::defect("crack"),
                        0.91,
                        Timestamp::from_millis(1_400),
                    )
                })
                .collect(),
            state,
            decision,
            closed_time: Timestamp::from_millis(1_500),
        }
    }

    #[test]
    fn record_output_lists_missing_clients() {
        let output = RecordOutput::from(&record(7, RecordState::Expired, Decision::Eject, 1));
        assert_eq!(output.id, 7);
        assert_eq!(output.state, "EXPIRED");
        assert_eq!(output.decision, "EJECT");
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].classification, "defect:crack");
        assert_eq!(output.missing_clients, vec!["jetson-2"]);
    }

    #[test]
    fn summary_counts_decisions() {
        let records = vec![
            record(1, RecordState::Decided, Decision::Pass, 2),
            record(2, RecordState::Decided, Decision::Eject, 2),
            record(3, RecordState::Expired, Decision::Eject, 0),
        ];
        let summary = RecordsSummary::of(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.ejected, 2);
        assert_eq!(summary.timed_out, 1);
    }
}
