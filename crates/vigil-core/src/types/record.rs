use serde::{Deserialize, Serialize};

use crate::types::id::{ClientId, RecordId};
use crate::types::inspection::{Decision, InspectionResult, RecordState};
use crate::types::time::Timestamp;

/// Immutable row appended to the record store when a tracking record closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedRecord {
    pub id: RecordId,
    pub trigger_time: Timestamp,
    pub deadline: Timestamp,
    pub expected_clients: Vec<ClientId>,
    pub results: Vec<InspectionResult>,
    pub state: RecordState,
    pub decision: Decision,
    pub closed_time: Timestamp,
}

impl ClosedRecord {
    #[must_use]
    pub fn missing_clients(&self) -> Vec<&ClientId> {
        self.expected_clients
            .iter()
            .filter(|c| !self.results.iter().any(|r| &r.client_id == *c))
            .collect()
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.state, RecordState::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::inspection::Classification;

    #[test]
    fn missing_clients_lists_silent_nodes() {
        let record = ClosedRecord {
            id: RecordId::new(1),
            trigger_time: Timestamp::ZERO,
            deadline: Timestamp::from_secs(10),
            expected_clients: vec![ClientId::new("a"), ClientId::new("b")],
            results: vec![InspectionResult::new(
                ClientId::new("a"),
                Classification::no_defect(),
                0.1,
                Timestamp::from_secs(2),
            )],
            state: RecordState::Expired,
            decision: Decision::Eject,
            closed_time: Timestamp::from_secs(10),
        };

        assert_eq!(record.missing_clients(), vec![&ClientId::new("b")]);
        assert!(record.is_timeout());
    }
}
