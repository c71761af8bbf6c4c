use serde::{Deserialize, Serialize};

/// The three logical channels the agent uses on the message bus.
///
/// Topic strings are deployment configuration: the agent only relies on the
/// role each channel plays.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Topics {
    /// Channel the agent subscribes to for inbound requests.
    pub request: String,
    /// Channel carrying response and error envelopes.
    pub response: String,
    /// Retained channel carrying the agent's status announcements.
    pub status: String,
}

impl Topics {
    /// Builds a topic set from explicit channel names.
    #[must_use]
    pub fn new(
        request: impl Into<String>,
        response: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            request: request.into(),
            response: response.into(),
            status: status.into(),
        }
    }

    /// Builds a topic set rooted at `prefix`, e.g. `castle/desktop`.
    #[must_use]
    pub fn under(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self::new(
            format!("{prefix}/request"),
            format!("{prefix}/response"),
            format!("{prefix}/status"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_trims_trailing_separator() {
        let topics = Topics::under("lab/agent-7/");
        assert_eq!(topics.request, "lab/agent-7/request");
        assert_eq!(topics.response, "lab/agent-7/response");
        assert_eq!(topics.status, "lab/agent-7/status");
    }
}
