use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use vigil_core::{ClientId, Command, ControllerMessage, Outgoing};

/// Identifies one accepted connection for the life of the controller.
pub type ConnectionId = u64;

#[derive(Debug)]
struct Route {
    conn_id: ConnectionId,
    tx: mpsc::Sender<Outgoing>,
}

/// Maps each client to the outbound queue of its current supervisor
/// connection. Delivery is fire-and-forget: a command is written to the
/// queue or dropped, never awaited.
#[derive(Debug, Default)]
pub struct CommandRouter {
    routes: HashMap<ClientId, Route>,
}

impl CommandRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the route for a client. A newer connection replaces an
    /// older one; the replaced connection id is returned.
    pub fn register(
        &mut self,
        client_id: ClientId,
        conn_id: ConnectionId,
        tx: mpsc::Sender<Outgoing>,
    ) -> Option<ConnectionId> {
        self.routes
            .insert(client_id, Route { conn_id, tx })
            .map(|old| old.conn_id)
    }

    /// Removes the route only if it still belongs to `conn_id`.
    pub fn unregister(&mut self, client_id: &ClientId, conn_id: ConnectionId) -> bool {
        if self
            .routes
            .get(client_id)
            .is_some_and(|route| route.conn_id == conn_id)
        {
            self.routes.remove(client_id);
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_connected(&self, client_id: &ClientId) -> bool {
        self.routes.contains_key(client_id)
    }

    /// Publishes a command on its target's connection. Returns whether it
    /// was handed to the connection's writer.
    pub fn deliver(&mut self, command: &Command) -> bool {
        let Some(route) = self.routes.get(&command.target) else {
            tracing::warn!(client_id = %command.target, action = %command.action, "No connection for command");
            return false;
        };
        let msg = Outgoing::Edge(ControllerMessage::Command(command.clone()));
        match route.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client_id = %command.target, "Command queue full, command dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(client_id = %command.target, "Connection gone, removing route");
                self.routes.remove(&command.target);
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use vigil_core::{Action, Timestamp};

    fn command(target: &str) -> Command {
        Command::new(ClientId::new(target), Action::Start, Timestamp::from_secs(1))
    }

    #[tokio::test]
    async fn delivers_to_registered_connection() {
        let mut router = CommandRouter::new();
        let (tx, mut rx) = mpsc::channel(4);
        router.register(ClientId::new("jetson-1"), 1, tx);

        assert!(router.deliver(&command("jetson-1")));
        let msg = rx.recv().await.expect("command");
        assert_eq!(msg, Outgoing::Edge(ControllerMessage::Command(command("jetson-1"))));
    }

    #[test]
    fn missing_route_is_not_delivered() {
        let mut router = CommandRouter::new();
        assert!(!router.deliver(&command("jetson-2")));
    }

    #[test]
    fn stale_connection_cannot_unregister_newer_route() {
        let mut router = CommandRouter::new();
        let id = ClientId::new("jetson-1");
        let (old_tx, _old_rx) = mpsc::channel(1);
        let (new_tx, _new_rx) = mpsc::channel(1);

        router.register(id.clone(), 1, old_tx);
        assert_eq!(router.register(id.clone(), 2, new_tx), Some(1));

        assert!(!router.unregister(&id, 1));
        assert!(router.is_connected(&id));
        assert!(router.unregister(&id, 2));
        assert!(!router.is_connected(&id));
    }

    #[test]
    fn closed_connection_drops_route() {
        let mut router = CommandRouter::new();
        let id = ClientId::new("jetson-1");
        let (tx, rx) = mpsc::channel(1);
        router.register(id.clone(), 1, tx);
        drop(rx);

        assert!(!router.deliver(&command("jetson-1")));
        assert!(!router.is_connected(&id));
    }
}
