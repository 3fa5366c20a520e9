use std::cmp::Reverse;
use std::collections::BinaryHeap;

use vigil_core::{RecordId, Timestamp};

/// Min-heap of pending deadlines backing the single deadline timer.
///
/// Entries are never removed when a record closes early. The tracker checks
/// each popped entry against the live record and discards stale ones.
#[derive(Debug, Default)]
pub struct DeadlineSchedule {
    heap: BinaryHeap<Reverse<(Timestamp, RecordId)>>,
}

impl DeadlineSchedule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, deadline: Timestamp, id: RecordId) {
        self.heap.push(Reverse((deadline, id)));
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Removes and returns every entry with `deadline <= now`, earliest first.
    pub fn pop_due(&mut self, now: Timestamp) -> Vec<(Timestamp, RecordId)> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, _))) = self.heap.peek() {
            if *deadline > now {
                break;
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order() {
        let mut schedule = DeadlineSchedule::new();
        schedule.push(Timestamp::from_secs(12), RecordId::new(2));
        schedule.push(Timestamp::from_secs(10), RecordId::new(1));
        schedule.push(Timestamp::from_secs(15), RecordId::new(3));

        assert_eq!(schedule.next_deadline(), Some(Timestamp::from_secs(10)));

        let due = schedule.pop_due(Timestamp::from_secs(12));
        assert_eq!(
            due,
            vec![
                (Timestamp::from_secs(10), RecordId::new(1)),
                (Timestamp::from_secs(12), RecordId::new(2)),
            ]
        );
        assert_eq!(schedule.next_deadline(), Some(Timestamp::from_secs(15)));
    }

    #[test]
    fn nothing_due_before_first_deadline() {
        let mut schedule = DeadlineSchedule::new();
        schedule.push(Timestamp::from_secs(10), RecordId::new(1));
        assert!(schedule.pop_due(Timestamp::from_millis(9_999)).is_empty());
        assert_eq!(schedule.next_deadline(), Some(Timestamp::from_secs(10)));
    }

    #[test]
    fn equal_deadlines_break_ties_by_id() {
        let mut schedule = DeadlineSchedule::new();
        schedule.push(Timestamp::from_secs(10), RecordId::new(7));
        schedule.push(Timestamp::from_secs(10), RecordId::new(3));
        let due = schedule.pop_due(Timestamp::from_secs(10));
        assert_eq!(due[0].1, RecordId::new(3));
        assert_eq!(due[1].1, RecordId::new(7));
        assert_eq!(schedule.next_deadline(), None);
    }

    #[test]
    fn clear_forgets_every_deadline() {
        let mut schedule = DeadlineSchedule::new();
        schedule.push(Timestamp::from_secs(10), RecordId::new(1));
        schedule.push(Timestamp::from_secs(11), RecordId::new(2));
        schedule.clear();
        assert_eq!(schedule.next_deadline(), None);
        assert!(schedule.pop_due(Timestamp::from_secs(60)).is_empty());
    }
}
