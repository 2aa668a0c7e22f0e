use serde::{Deserialize, Serialize};

/// Progress of a token fetch or an authorized request.
///
/// Always derived from current state on read, never stored as the
/// combined value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// The client has no authenticated session
    Unauthorized,
    /// Waiting on an upstream dependency
    Waiting,
    /// Eligible to fetch
    Ready,
    /// A call is in flight
    Loading,
    /// The last call succeeded and its result is held
    Loaded,
    /// The last call failed
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&FetchStatus::Unauthorized).unwrap(),
            "\"unauthorized\""
        );
        assert_eq!(
            serde_json::to_string(&FetchStatus::Loading).unwrap(),
            "\"loading\""
        );
    }
}
