use crate::session::TaskKind;

/// Failures raised by the upstream conversational session.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Failed to connect to upstream session: {0}")]
    Connect(String),
    #[error("Failed to send to upstream session: {0}")]
    Send(String),
    #[error("Failed to read from upstream session: {0}")]
    Receive(String),
    #[error("Upstream session closed the connection")]
    Closed,
    #[error("Unexpected upstream message: {0}")]
    Protocol(String),
    #[error("Timed out waiting for upstream: {0}")]
    Timeout(String),
}

/// Failures on the client side of the relay.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Client connection closed")]
    Closed,
    #[error("Client transport failure: {0}")]
    Io(String),
}

/// Anything that ends a session early.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Precondition(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Relay task '{task}' panicked")]
    Panicked { task: TaskKind },
}

impl SessionError {
    /// Whether the client should be told about this failure before the
    /// connection closes. Transport failures cannot be reported.
    pub fn notifies_client(&self) -> bool {
        !matches!(self, SessionError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            UpstreamError::Connect("refused".into()).to_string(),
            "Failed to connect to upstream session: refused"
        );
        let wrapped: SessionError = UpstreamError::Closed.into();
        assert_eq!(
            wrapped.to_string(),
            "Upstream session closed the connection"
        );
        let panicked = SessionError::Panicked {
            task: TaskKind::SilenceMonitor,
        };
        assert_eq!(panicked.to_string(), "Relay task 'silence_monitor' panicked");
    }

    #[test]
    fn test_transport_errors_are_not_reported_to_client() {
        assert!(!SessionError::Transport(TransportError::Closed).notifies_client());
        assert!(SessionError::Upstream(UpstreamError::Closed).notifies_client());
        assert!(SessionError::Precondition("no name".into()).notifies_client());
    }
}
