use std::fmt;

use tokio::sync::watch;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Closed,
}

impl SessionState {
    /// Forward steps happen exactly once each; `Closed` is reachable from
    /// anywhere and is terminal.
    pub fn can_become(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Active)
                | (Connecting | Authenticating | Active, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared view of one session's state. Writers go through `advance`/`close`,
/// readers hold a `watch::Receiver`.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: watch::Sender<SessionState>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Connecting);
        Self { tx }
    }

    pub fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn advance(&self, next: SessionState) -> Result<(), ClientError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|current| {
            if current.can_become(next) {
                *current = next;
                true
            } else {
                outcome = Err(ClientError::InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });
        outcome
    }

    /// Moves to `Closed`. Returns false if the session was already closed.
    pub fn close(&self) -> bool {
        self.advance(SessionState::Closed).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_forward_exactly_once() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), SessionState::Connecting);

        assert!(cell.advance(SessionState::Active).is_err());
        cell.advance(SessionState::Authenticating).unwrap();
        assert!(cell.advance(SessionState::Authenticating).is_err());
        cell.advance(SessionState::Active).unwrap();
        assert!(cell.advance(SessionState::Authenticating).is_err());
        assert_eq!(cell.get(), SessionState::Active);
    }

    #[test]
    fn closed_is_terminal_and_reachable_from_anywhere() {
        for steps in 0..3 {
            let cell = StateCell::new();
            let forward = [SessionState::Authenticating, SessionState::Active];
            for next in forward.iter().take(steps) {
                cell.advance(*next).unwrap();
            }
            assert!(cell.close());
            assert!(!cell.close());
            assert!(matches!(
                cell.advance(SessionState::Active),
                Err(ClientError::InvalidTransition {
                    from: SessionState::Closed,
                    ..
                })
            ));
        }
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();
        cell.advance(SessionState::Authenticating).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SessionState::Authenticating);
    }
}
