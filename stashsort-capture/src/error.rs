//! Capture error types.

use thiserror::Error;

/// Errors that stop a capture session from starting or keep running.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("interface {0} has no IPv4 address")]
    NoIpv4Address(String),

    #[error("insufficient privilege to capture: {0}")]
    PermissionDenied(String),

    #[error("capture backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("capture backend error: {0}")]
    Backend(String),

    #[error("capture source closed")]
    Closed,

    #[error("invalid capture filter: {0}")]
    InvalidFilter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file error: {0}")]
    State(#[from] serde_json::Error),
}

impl CaptureError {
    /// Returns whether the user has to grant capture rights (run elevated,
    /// install a driver) before retrying.
    pub fn is_privilege_error(&self) -> bool {
        matches!(self, CaptureError::PermissionDenied(_))
    }

    /// Returns whether retrying the same start may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Backend(_) | CaptureError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        assert!(CaptureError::PermissionDenied("npcap".into()).is_privilege_error());
        assert!(!CaptureError::InterfaceNotFound("eth9".into()).is_privilege_error());
        assert!(CaptureError::Backend("read failed".into()).is_retryable());
        assert!(!CaptureError::BackendUnavailable("no pcap".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = CaptureError::NoIpv4Address("Ethernet".into());
        assert_eq!(err.to_string(), "interface Ethernet has no IPv4 address");
    }
}
