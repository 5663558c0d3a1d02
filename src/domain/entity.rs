//! Kinds of entities carried by the message bus.

use serde::{Deserialize, Serialize};

/// Whether a subscription streams events or actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Notifications emitted by a service.
    Event,
    /// Triggerable operations exposed by a service.
    Action,
}

impl EntityKind {
    /// Returns the path segment used by the bus for this kind.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Action => "action",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path_segment())
    }
}
