//! Field extraction helpers for structured logging

use crate::dispatch::{DispatchError, Selection};
use crate::registry::FailureKind;

/// Extract a status label and error message from a selection result
///
/// - For Ok results: ("granted", None)
/// - For Err results: (error label, Some(error message))
///
/// # Examples
///
/// ```
/// use keypool::dispatch::{DispatchError, Selection};
/// use keypool::logging::dispatch_status;
///
/// let err: Result<Selection, DispatchError> = Err(DispatchError::RetriesExhausted {
///     model: "m".to_string(),
///     attempts: 4,
/// });
/// let (status, message) = dispatch_status(&err);
/// assert_eq!(status, "retries_exhausted");
/// assert!(message.unwrap().contains("4 attempts"));
/// ```
pub fn dispatch_status(result: &Result<Selection, DispatchError>) -> (&'static str, Option<String>) {
    match result {
        Ok(_) => ("granted", None),
        Err(e) => (e.as_str(), Some(e.to_string())),
    }
}

/// Label for a failure kind, with free-form detail truncated to `max_len`
/// characters.
pub fn failure_label(kind: &FailureKind, max_len: usize) -> String {
    let label = kind.to_string();
    if label.chars().count() <= max_len {
        return label;
    }
    let truncated: String = label.chars().take(max_len).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_status_granted() {
        let ok: Result<Selection, DispatchError> = Ok(Selection {
            credential_id: "k".to_string(),
            model: "m".to_string(),
            examined: 1,
        });
        assert_eq!(dispatch_status(&ok), ("granted", None));
    }

    #[test]
    fn test_dispatch_status_unavailable() {
        let err: Result<Selection, DispatchError> = Err(DispatchError::NoAvailableCredential {
            model: "m".to_string(),
            examined: 3,
            retry_after: None,
        });
        let (status, message) = dispatch_status(&err);
        assert_eq!(status, "no_available_credential");
        assert_eq!(
            message.as_deref(),
            Some("No available credential for model 'm' (3 examined)")
        );
    }

    #[test]
    fn test_failure_label_truncates() {
        let kind = FailureKind::Other("x".repeat(200));
        let label = failure_label(&kind, 20);
        assert_eq!(label.chars().count(), 23);
        assert!(label.ends_with("..."));
        assert_eq!(failure_label(&FailureKind::Timeout, 20), "timeout");
    }
}
