use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use vigil_core::{
    ClientId, ClosedRecord, Decision, InspectionResult, RecordId, RecordState, Timestamp,
    TrackerError,
};

use crate::config::ConveyorGeometry;
use crate::schedule::DeadlineSchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Accepted,
    Duplicate,
    NotExpected,
    Closed,
}

/// One physical item between the entry sensor and the decision point.
#[derive(Debug, Clone)]
pub struct TrackingRecord {
    id: RecordId,
    trigger_time: Timestamp,
    deadline: Timestamp,
    expected: BTreeSet<ClientId>,
    results: BTreeMap<ClientId, InspectionResult>,
    state: RecordState,
    decision: Option<Decision>,
    closed_time: Option<Timestamp>,
}

impl TrackingRecord {
    fn new(
        id: RecordId,
        trigger_time: Timestamp,
        deadline: Timestamp,
        expected: BTreeSet<ClientId>,
    ) -> Self {
        Self {
            id,
            trigger_time,
            deadline,
            expected,
            results: BTreeMap::new(),
            state: RecordState::Open,
            decision: None,
            closed_time: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    #[must_use]
    pub const fn trigger_time(&self) -> Timestamp {
        self.trigger_time
    }

    #[must_use]
    pub const fn deadline(&self) -> Timestamp {
        self.deadline
    }

    #[must_use]
    pub const fn state(&self) -> RecordState {
        self.state
    }

    #[must_use]
    pub const fn decision(&self) -> Option<Decision> {
        self.decision
    }

    #[must_use]
    pub const fn closed_time(&self) -> Option<Timestamp> {
        self.closed_time
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, RecordState::Open)
    }

    #[must_use]
    pub fn expects(&self, client: &ClientId) -> bool {
        self.expected.contains(client)
    }

    #[must_use]
    pub fn has_result_from(&self, client: &ClientId) -> bool {
        self.results.contains_key(client)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.expected.len()
    }

    pub fn results(&self) -> impl Iterator<Item = &InspectionResult> {
        self.results.values()
    }

    #[must_use]
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Adds a result. A second result from the same client never replaces
    /// the first.
    pub fn insert_result(&mut self, result: InspectionResult) -> InsertOutcome {
        if !self.is_open() {
            return InsertOutcome::Closed;
        }
        if !self.expects(&result.client_id) {
            return InsertOutcome::NotExpected;
        }
        if self.has_result_from(&result.client_id) {
            return InsertOutcome::Duplicate;
        }
        self.results.insert(result.client_id.clone(), result);
        InsertOutcome::Accepted
    }

    fn close(
        &mut self,
        state: RecordState,
        decision: Decision,
        now: Timestamp,
    ) -> Result<ClosedRecord, TrackerError> {
        if !self.is_open() || !state.is_terminal() {
            return Err(TrackerError::NotOpen(self.id));
        }
        self.state = state;
        self.decision = Some(decision);
        self.closed_time = Some(now);

        Ok(ClosedRecord {
            id: self.id,
            trigger_time: self.trigger_time,
            deadline: self.deadline,
            expected_clients: self.expected.iter().cloned().collect(),
            results: self.results.values().cloned().collect(),
            state,
            decision,
            closed_time: now,
        })
    }
}

/// Owns every open record, the deadline schedule and the id counter.
#[derive(Debug)]
pub struct BottleTracker {
    geometry: ConveyorGeometry,
    expected: BTreeSet<ClientId>,
    open: HashMap<RecordId, TrackingRecord>,
    schedule: DeadlineSchedule,
    next_id: RecordId,
    recently_closed: VecDeque<RecordId>,
    closed_history: usize,
}

impl BottleTracker {
    #[must_use]
    pub fn new(
        geometry: ConveyorGeometry,
        expected: impl IntoIterator<Item = ClientId>,
        closed_history: usize,
    ) -> Self {
        Self {
            geometry,
            expected: expected.into_iter().collect(),
            open: HashMap::new(),
            schedule: DeadlineSchedule::new(),
            next_id: RecordId::new(1),
            recently_closed: VecDeque::with_capacity(closed_history),
            closed_history,
        }
    }

    /// Opens a record for a trigger. A sensor-assigned id that collides with
    /// an open record is rejected; the open record is left untouched.
    pub fn open(
        &mut self,
        trigger_time: Timestamp,
        sensor_id: Option<RecordId>,
    ) -> Result<&TrackingRecord, TrackerError> {
        let id = match sensor_id {
            Some(id) => {
                if self.open.contains_key(&id) {
                    return Err(TrackerError::DuplicateTrigger(id));
                }
                if id >= self.next_id {
                    self.next_id = id.next();
                }
                id
            }
            None => {
                let mut id = self.next_id;
                while self.open.contains_key(&id) {
                    id = id.next();
                }
                self.next_id = id.next();
                id
            }
        };

        let deadline = self.geometry.deadline_after(trigger_time);
        self.schedule.push(deadline, id);
        let record = TrackingRecord::new(id, trigger_time, deadline, self.expected.clone());
        Ok(self.open.entry(id).or_insert(record))
    }

    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&TrackingRecord> {
        self.open.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: RecordId) -> Option<&mut TrackingRecord> {
        self.open.get_mut(&id)
    }

    /// Open records, oldest trigger first.
    #[must_use]
    pub fn open_records(&self) -> Vec<&TrackingRecord> {
        let mut records: Vec<_> = self.open.values().collect();
        records.sort_by_key(|r| (r.trigger_time, r.id));
        records
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.schedule.next_deadline()
    }

    /// Open records whose deadline has been reached, earliest first.
    pub fn take_due(&mut self, now: Timestamp) -> Vec<RecordId> {
        self.schedule
            .pop_due(now)
            .into_iter()
            .filter(|(deadline, id)| {
                self.open
                    .get(id)
                    .is_some_and(|r| r.is_open() && r.deadline == *deadline)
            })
            .map(|(_, id)| id)
            .collect()
    }

    /// Performs the record's single terminal transition and removes it from
    /// the open set.
    pub fn close(
        &mut self,
        id: RecordId,
        state: RecordState,
        decision: Decision,
        now: Timestamp,
    ) -> Result<ClosedRecord, TrackerError> {
        let record = self.open.get_mut(&id).ok_or(TrackerError::NotOpen(id))?;
        let closed = record.close(state, decision, now)?;
        self.open.remove(&id);
        self.remember_closed(id);
        Ok(closed)
    }

    #[must_use]
    pub fn was_recently_closed(&self, id: RecordId) -> bool {
        self.recently_closed.contains(&id)
    }

    /// Forgets every open record without closing it.
    pub fn abandon_open(&mut self) -> Vec<RecordId> {
        let ids: Vec<_> = self.open.drain().map(|(id, _)| id).collect();
        self.schedule.clear();
        ids
    }

    fn remember_closed(&mut self, id: RecordId) {
        if self.closed_history == 0 {
            return;
        }
        if self.recently_closed.len() == self.closed_history {
            self.recently_closed.pop_front();
        }
        self.recently_closed.push_back(id);
    }
}
