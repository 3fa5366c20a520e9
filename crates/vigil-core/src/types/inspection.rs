use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::id::{ClientId, RecordId};
use crate::types::time::Timestamp;

pub const NO_DEFECT_CATEGORY: &str = "ok";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub defect: bool,
    pub category: String,
}

impl Classification {
    #[must_use]
    pub fn defect(category: impl Into<String>) -> Self {
        Self {
            defect: true,
            category: category.into(),
        }
    }

    #[must_use]
    pub fn no_defect() -> Self {
        Self {
            defect: false,
            category: NO_DEFECT_CATEGORY.to_string(),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.defect {
            write!(f, "defect:{}", self.category)
        } else {
            write!(f, "no-defect")
        }
    }
}

/// One inference outcome from one client, stamped with the controller's
/// receive time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub client_id: ClientId,
    pub classification: Classification,
    pub confidence: f32,
    pub received_time: Timestamp,
    pub captured_time: Option<Timestamp>,
    pub record_ref: Option<RecordId>,
}

impl InspectionResult {
    #[must_use]
    pub const fn new(
        client_id: ClientId,
        classification: Classification,
        confidence: f32,
        received_time: Timestamp,
    ) -> Self {
        Self {
            client_id,
            classification,
            confidence,
            received_time,
            captured_time: None,
            record_ref: None,
        }
    }

    #[must_use]
    pub const fn with_record_ref(mut self, record: RecordId) -> Self {
        self.record_ref = Some(record);
        self
    }

    #[must_use]
    pub const fn with_captured_time(mut self, captured: Timestamp) -> Self {
        self.captured_time = Some(captured);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Pass,
    Eject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Eject => write!(f, "EJECT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecordState {
    #[default]
    Open,
    /// Closed because every expected client reported before the deadline.
    Decided,
    /// Closed by the deadline with partial or no results.
    Expired,
}

impl RecordState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Decided => write!(f, "DECIDED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_display() {
        assert_eq!(Classification::defect("crack").to_string(), "defect:crack");
        assert_eq!(Classification::no_defect().to_string(), "no-defect");
    }

    #[test]
    fn terminal_states() {
        assert!(!RecordState::Open.is_terminal());
        assert!(RecordState::Decided.is_terminal());
        assert!(RecordState::Expired.is_terminal());
    }

    #[test]
    fn result_builders() {
        let result = InspectionResult::new(
            ClientId::new("jetson-1"),
            Classification::no_defect(),
            0.4,
            Timestamp::from_secs(3),
        )
        .with_record_ref(RecordId::new(9))
        .with_captured_time(Timestamp::from_millis(2900));

        assert_eq!(result.record_ref, Some(RecordId::new(9)));
        assert_eq!(result.captured_time, Some(Timestamp::from_millis(2900)));
    }
}
