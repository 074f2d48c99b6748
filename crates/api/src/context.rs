//! Request-scoped contexts bound by middleware.

/// The authenticated caller subject, as consulted by the policy decision
/// point. Requests without a usable bearer token run as the anonymous
/// subject; whether that subject may do anything is the policy's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectContext {
    subject: String,
}

pub const ANONYMOUS_SUBJECT: &str = "anonymous";

impl SubjectContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_SUBJECT)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
