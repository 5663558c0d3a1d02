//! Subscription target: what a single subscription streams.
//!
//! A [`SubscriptionTarget`] is built once from command-line input and moved
//! into a transport client. Nothing about it changes while a session runs.

use super::EntityKind;
use crate::error::BusError;

/// Comma-separated name filter, kept exactly as the operator typed it.
///
/// Names are neither reordered nor de-duplicated. An empty filter is not
/// representable: [`NameFilter::parse`] turns empty input into `None`, so
/// "no filter" has exactly one wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameFilter(String);

impl NameFilter {
    /// Builds a filter from operator input. Blank input means no filter;
    /// anything else is kept byte for byte.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        (!raw.trim().is_empty()).then(|| Self(raw.to_string()))
    }

    /// Returns the filter as it goes on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NameFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable description of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTarget {
    entity_kind: EntityKind,
    source_id: String,
    name_filter: Option<NameFilter>,
    buffer_size: usize,
}

impl SubscriptionTarget {
    /// Creates a target.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if `source_id` is blank or
    /// `buffer_size` is zero.
    pub fn new(
        entity_kind: EntityKind,
        source_id: impl Into<String>,
        name_filter: Option<NameFilter>,
        buffer_size: usize,
    ) -> Result<Self, BusError> {
        let source_id = source_id.into();
        if source_id.trim().is_empty() {
            return Err(BusError::InvalidConfig(
                "source id must not be empty".to_string(),
            ));
        }
        if buffer_size == 0 {
            return Err(BusError::InvalidConfig(
                "message buffer size must be positive".to_string(),
            ));
        }
        Ok(Self {
            entity_kind,
            source_id,
            name_filter,
            buffer_size,
        })
    }

    /// Entity kind streamed by this subscription.
    #[must_use]
    pub const fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    /// Identifier of the service owning the stream.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Optional name filter.
    #[must_use]
    pub const fn name_filter(&self) -> Option<&NameFilter> {
        self.name_filter.as_ref()
    }

    /// Fixed read buffer size for raw sessions, in bytes.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn blank_filter_is_none() {
        assert_eq!(NameFilter::parse(""), None);
        assert_eq!(NameFilter::parse("   "), None);
    }

    #[test]
    fn filter_is_kept_verbatim() {
        let Some(filter) = NameFilter::parse("b,a,b") else {
            panic!("expected a filter");
        };
        assert_eq!(filter.as_str(), "b,a,b");
    }

    #[test]
    fn surrounding_whitespace_is_not_trimmed() {
        let Some(filter) = NameFilter::parse(" a,b ") else {
            panic!("expected a filter");
        };
        assert_eq!(filter.as_str(), " a,b ");
        assert_eq!(filter.to_string(), " a,b ");
    }

    #[test]
    fn rejects_empty_source() {
        let result = SubscriptionTarget::new(EntityKind::Event, " ", None, 1024);
        assert!(matches!(result, Err(BusError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_buffer() {
        let result = SubscriptionTarget::new(EntityKind::Action, "svc", None, 0);
        assert!(matches!(result, Err(BusError::InvalidConfig(_))));
    }

    #[test]
    fn accessors() {
        let Ok(target) =
            SubscriptionTarget::new(EntityKind::Action, "svc", NameFilter::parse("x"), 512)
        else {
            panic!("valid target rejected");
        };
        assert_eq!(target.entity_kind(), EntityKind::Action);
        assert_eq!(target.source_id(), "svc");
        assert_eq!(target.name_filter().map(NameFilter::as_str), Some("x"));
        assert_eq!(target.buffer_size(), 512);
    }
}
