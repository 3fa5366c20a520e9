use std::time::Duration;

use vigil_core::{ClientId, Liveness, Timestamp};

use crate::clients::ClientTable;
use crate::config::LivenessThresholds;

/// Liveness as a pure function of heartbeat age. A client that never sent a
/// heartbeat is offline.
#[must_use]
pub fn classify(age: Option<Duration>, thresholds: &LivenessThresholds) -> Liveness {
    match age {
        None => Liveness::Offline,
        Some(age) if age < thresholds.online => Liveness::Online,
        Some(age) if age < thresholds.offline => Liveness::Stale,
        Some(_) => Liveness::Offline,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessTransition {
    pub client_id: ClientId,
    pub from: Liveness,
    pub to: Liveness,
}

/// Recomputes client liveness from heartbeat timing. Transitions are
/// returned to the caller; nothing here touches tracking records.
#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    thresholds: LivenessThresholds,
}

impl LivenessMonitor {
    #[must_use]
    pub const fn new(thresholds: LivenessThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub const fn thresholds(&self) -> &LivenessThresholds {
        &self.thresholds
    }

    /// Records a heartbeat. Returns the transition if liveness changed.
    pub fn on_heartbeat(
        &self,
        clients: &mut ClientTable,
        client_id: &ClientId,
        now: Timestamp,
    ) -> Option<LivenessTransition> {
        let client = clients.get_mut(client_id)?;
        if client.last_heartbeat.is_none_or(|last| now >= last) {
            client.last_heartbeat = Some(now);
        }
        self.reclassify(client_id, &mut client.liveness, client.last_heartbeat, now)
    }

    pub fn sweep(&self, clients: &mut ClientTable, now: Timestamp) -> Vec<LivenessTransition> {
        clients
            .iter_mut()
            .filter_map(|client| {
                let id = client.client_id.clone();
                self.reclassify(&id, &mut client.liveness, client.last_heartbeat, now)
            })
            .collect()
    }

    fn reclassify(
        &self,
        client_id: &ClientId,
        current: &mut Liveness,
        last_heartbeat: Option<Timestamp>,
        now: Timestamp,
    ) -> Option<LivenessTransition> {
        let age = last_heartbeat.map(|last| now.saturating_duration_since(last));
        let next = classify(age, &self.thresholds);
        if next == *current {
            return None;
        }
        let transition = LivenessTransition {
            client_id: client_id.clone(),
            from: *current,
            to: next,
        };
        *current = next;
        Some(transition)
    }
}
