//! Broadcast topic keys.
//!
//! A topic is `queue🦞{queue id}` optionally followed by a scope suffix.
//! The lobster never occurs in a UUID or an email address, so distinct
//! scopes can never produce the same key.

use std::fmt;

use crate::ids::QueueId;

/// Separator between topic segments.
pub const SEPARATOR: &str = "🦞";

/// Fixed namespace prefix.
pub const NAMESPACE: &str = "queue";

/// Audience of a topic within one queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every watcher of the queue.
    Generic,
    /// Course admins only.
    Admin,
    /// Everybody who is not an admin.
    NonPrivileged,
    /// One signed-in user.
    Personal(String),
}

impl Scope {
    /// Short label used for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Admin => "admin",
            Self::NonPrivileged => "non_privileged",
            Self::Personal(_) => "personal",
        }
    }
}

/// A derived topic key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Topic {
    key: String,
    scope: Scope,
}

impl Topic {
    /// Build the key for `scope` on `queue`.
    #[must_use]
    pub fn new(queue: QueueId, scope: Scope) -> Self {
        let key = match &scope {
            Scope::Generic => format!("{NAMESPACE}{SEPARATOR}{queue}"),
            Scope::Admin => format!("{NAMESPACE}{SEPARATOR}{queue}{SEPARATOR}admin"),
            Scope::NonPrivileged => {
                format!("{NAMESPACE}{SEPARATOR}{queue}{SEPARATOR}non_privileged")
            }
            Scope::Personal(email) => {
                format!("{NAMESPACE}{SEPARATOR}{queue}{SEPARATOR}user{SEPARATOR}{email}")
            }
        };
        Self { key, scope }
    }

    /// Topic every watcher of `queue` hears.
    #[must_use]
    pub fn generic(queue: QueueId) -> Self {
        Self::new(queue, Scope::Generic)
    }

    /// Admin-only topic of `queue`.
    #[must_use]
    pub fn admin(queue: QueueId) -> Self {
        Self::new(queue, Scope::Admin)
    }

    /// Non-admin topic of `queue`.
    #[must_use]
    pub fn non_privileged(queue: QueueId) -> Self {
        Self::new(queue, Scope::NonPrivileged)
    }

    /// Private topic of `email` on `queue`.
    #[must_use]
    pub fn personal(queue: QueueId, email: impl Into<String>) -> Self {
        Self::new(queue, Scope::Personal(email.into()))
    }

    /// The key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The audience.
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_deterministic_and_distinct() {
        let queue: QueueId = "0190b3a4-6f2e-7c3d-8a1b-2c3d4e5f6a7b".parse().unwrap();
        let topics = [
            Topic::generic(queue),
            Topic::admin(queue),
            Topic::non_privileged(queue),
            Topic::personal(queue, "admin"),
            Topic::personal(queue, "ta@example.edu"),
        ];

        assert_eq!(
            topics[0].as_str(),
            "queue🦞0190b3a4-6f2e-7c3d-8a1b-2c3d4e5f6a7b"
        );
        assert_eq!(
            topics[4].as_str(),
            "queue🦞0190b3a4-6f2e-7c3d-8a1b-2c3d4e5f6a7b🦞user🦞ta@example.edu"
        );
        assert_eq!(Topic::admin(queue), topics[1]);

        let keys: HashSet<&str> = topics.iter().map(Topic::as_str).collect();
        assert_eq!(keys.len(), topics.len());
    }
}
