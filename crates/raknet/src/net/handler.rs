use super::connection::SessionTable;
use super::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Disconnected,
    TimedOut,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Disconnected => "Disconnected",
            CloseReason::TimedOut => "TimedOut",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callbacks the transport server raises for the game layer.
///
/// `on_open` runs once when a session is created and always precedes any `on_data` for it.
/// `on_close` runs once when the session leaves the table; nothing else is raised for that
/// session afterwards.
pub trait ConnectionHandler {
    fn on_open(&mut self, session: &mut Session);

    fn on_close(&mut self, session: &Session, reason: CloseReason);

    /// `payload` starts with the logical packet id byte.
    fn on_data(&mut self, session: &mut Session, payload: &[u8]);

    fn on_tick(&mut self, _sessions: &mut SessionTable) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(CloseReason::Disconnected.as_str(), "Disconnected");
        assert_eq!(CloseReason::TimedOut.to_string(), "TimedOut");
    }
}
