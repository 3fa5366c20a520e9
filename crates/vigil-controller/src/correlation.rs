use std::fmt;

use vigil_core::{InspectionResult, RecordId};

use crate::tracker::TrackingRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The referenced record is not open: unknown, already decided or expired.
    UnknownRecord(RecordId),
    /// The referenced record does not expect this client.
    NotExpected(RecordId),
    /// No open record can take a result from this client.
    NoOpenRecord,
    /// The referenced record closed recently; the result arrived late.
    AlreadyClosed(RecordId),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRecord(id) => write!(f, "record {id} is not open"),
            Self::NotExpected(id) => write!(f, "record {id} does not expect this client"),
            Self::NoOpenRecord => write!(f, "no open record qualifies"),
            Self::AlreadyClosed(id) => write!(f, "record {id} already closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Record(RecordId),
    /// The client already supplied a result for this record.
    Duplicate(RecordId),
    Unattributable(DropReason),
}

/// Chooses which open record a result belongs to.
///
/// `open` is ordered oldest trigger first. Implementations must not pick a
/// record that already holds a result from the same client.
pub trait CorrelationPolicy: Send + Sync + fmt::Debug {
    fn attribute(&self, result: &InspectionResult, open: &[&TrackingRecord]) -> Attribution;
}

/// Oldest open record triggered no later than the result's receive time that
/// expects the client and has nothing from it yet. An explicit record
/// reference bypasses the search.
#[derive(Debug, Clone, Copy, Default)]
pub struct OldestOpenFirst;

impl CorrelationPolicy for OldestOpenFirst {
    fn attribute(&self, result: &InspectionResult, open: &[&TrackingRecord]) -> Attribution {
        let client = &result.client_id;

        if let Some(id) = result.record_ref {
            return match open.iter().find(|r| r.id() == id) {
                None => Attribution::Unattributable(DropReason::UnknownRecord(id)),
                Some(r) if !r.expects(client) => {
                    Attribution::Unattributable(DropReason::NotExpected(id))
                }
                Some(r) if r.has_result_from(client) => Attribution::Duplicate(id),
                Some(_) => Attribution::Record(id),
            };
        }

        let mut satisfied = None;
        for record in open
            .iter()
            .filter(|r| r.trigger_time() <= result.received_time && r.expects(client))
        {
            if !record.has_result_from(client) {
                return Attribution::Record(record.id());
            }
            satisfied = Some(record.id());
        }

        match satisfied {
            Some(id) => Attribution::Duplicate(id),
            None => Attribution::Unattributable(DropReason::NoOpenRecord),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ConveyorGeometry;
    use crate::tracker::BottleTracker;
    use vigil_core::{Classification, ClientId, Timestamp};

    fn tracker_with_records(trigger_secs: &[u64]) -> BottleTracker {
        let mut tracker = BottleTracker::new(
            ConveyorGeometry::new(0.5, 5.0).expect("valid geometry"),
            ["a", "b"].map(ClientId::new),
            16,
        );
        for secs in trigger_secs {
            tracker
                .open(Timestamp::from_secs(*secs), None)
                .expect("open");
        }
        tracker
    }

    fn result(client: &str, at_secs: u64) -> InspectionResult {
        InspectionResult::new(
            ClientId::new(client),
            Classification::no_defect(),
            0.5,
            Timestamp::from_secs(at_secs),
        )
    }

    #[test]
    fn picks_oldest_open_record() {
        let tracker = tracker_with_records(&[0, 1, 2]);
        let open = tracker.open_records();
        assert_eq!(
            OldestOpenFirst.attribute(&result("a", 3), &open),
            Attribution::Record(RecordId::new(1))
        );
    }

    #[test]
    fn skips_records_already_satisfied_by_client() {
        let mut tracker = tracker_with_records(&[0, 1]);
        tracker
            .get_mut(RecordId::new(1))
            .expect("open")
            .insert_result(result("a", 1));
        let open = tracker.open_records();
        assert_eq!(
            OldestOpenFirst.attribute(&result("a", 2), &open),
            Attribution::Record(RecordId::new(2))
        );
        assert_eq!(
            OldestOpenFirst.attribute(&result("b", 2), &open),
            Attribution::Record(RecordId::new(1))
        );
    }

    #[test]
    fn ignores_records_triggered_after_receipt() {
        let tracker = tracker_with_records(&[5]);
        let open = tracker.open_records();
        assert_eq!(
            OldestOpenFirst.attribute(&result("a", 4), &open),
            Attribution::Unattributable(DropReason::NoOpenRecord)
        );
    }

    #[test]
    fn all_satisfied_is_duplicate() {
        let mut tracker = tracker_with_records(&[0]);
        tracker
            .get_mut(RecordId::new(1))
            .expect("open")
            .insert_result(result("a", 1));
        let open = tracker.open_records();
        assert_eq!(
            OldestOpenFirst.attribute(&result("a", 2), &open),
            Attribution::Duplicate(RecordId::new(1))
        );
    }

    #[test]
    fn explicit_reference_must_name_open_record() {
        let tracker = tracker_with_records(&[0, 1]);
        let open = tracker.open_records();

        let targeted = result("a", 2).with_record_ref(RecordId::new(2));
        assert_eq!(
            OldestOpenFirst.attribute(&targeted, &open),
            Attribution::Record(RecordId::new(2))
        );

        let unknown = result("a", 2).with_record_ref(RecordId::new(99));
        assert_eq!(
            OldestOpenFirst.attribute(&unknown, &open),
            Attribution::Unattributable(DropReason::UnknownRecord(RecordId::new(99)))
        );

        let stranger = result("z", 2).with_record_ref(RecordId::new(1));
        assert_eq!(
            OldestOpenFirst.attribute(&stranger, &open),
            Attribution::Unattributable(DropReason::NotExpected(RecordId::new(1)))
        );
    }

    #[test]
    fn unknown_client_is_unattributable() {
        let tracker = tracker_with_records(&[0]);
        let open = tracker.open_records();
        assert_eq!(
            OldestOpenFirst.attribute(&result("z", 1), &open),
            Attribution::Unattributable(DropReason::NoOpenRecord)
        );
    }
}
