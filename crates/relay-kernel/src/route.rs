//! Route template records.
//!
//! A route template declares which gateway paths are proxyable and how long
//! the downstream payload may be cached. Path templates use the `{param}`
//! placeholder syntax:
//!
//! ```text
//! /clients/{client_id}                       # one placeholder
//! /clients/{client_id}/products/{product_id} # two placeholders
//! /clients/{client_id}/orders/invoice/{id}   # literals between placeholders
//! ```

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by administrative records (routes, channels).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

impl RecordStatus {
    /// Case-insensitive parse of the persisted status column.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(RecordStatus::Active),
            "inactive" => Some(RecordStatus::Inactive),
            _ => None,
        }
    }

    pub fn is_active(self) -> bool {
        self == RecordStatus::Active
    }
}

/// A proxyable path pattern with its cache lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTemplate {
    /// Path template, e.g. `/clients/{client_id}/products`.
    pub path_template: String,
    /// Seconds a downstream payload for this route may be served from cache.
    /// `0` disables caching for the route; unset means the gateway default.
    #[serde(default)]
    pub max_cache_seconds: Option<u64>,
    /// Only `Active` templates take part in matching.
    #[serde(default)]
    pub status: RecordStatus,
}

impl RouteTemplate {
    /// Create an active template.
    pub fn new(path_template: impl Into<String>, max_cache_seconds: u64) -> Self {
        Self {
            path_template: path_template.into(),
            max_cache_seconds: Some(max_cache_seconds),
            status: RecordStatus::Active,
        }
    }

    /// Builder: override the status.
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: fall back to the gateway default TTL.
    pub fn with_default_ttl(mut self) -> Self {
        self.max_cache_seconds = None;
        self
    }

    /// Iterate the non-empty `/`-separated segments of the template.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path_template.split('/').filter(|s| !s.is_empty())
    }

    /// Number of segments that contain no `{param}` placeholder.
    pub fn literal_segment_count(&self) -> usize {
        self.segments().filter(|s| !is_placeholder_segment(s)).count()
    }

    /// Zero-based index of the first segment carrying a placeholder, or the
    /// segment count when the template is fully literal.
    pub fn first_placeholder_index(&self) -> usize {
        let mut count = 0;
        for (idx, seg) in self.segments().enumerate() {
            if is_placeholder_segment(seg) {
                return idx;
            }
            count = idx + 1;
        }
        count
    }
}

fn is_placeholder_segment(segment: &str) -> bool {
    segment
        .find('{')
        .is_some_and(|open| segment[open..].contains('}'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_segments_are_counted() {
        let t = RouteTemplate::new("/clients/{client_id}/orders/invoice/{invoice_id}", 5);
        assert_eq!(t.literal_segment_count(), 3);
        assert_eq!(t.first_placeholder_index(), 1);
    }

    #[test]
    fn fully_literal_template() {
        let t = RouteTemplate::new("/clients", 5);
        assert_eq!(t.literal_segment_count(), 1);
        assert_eq!(t.first_placeholder_index(), 1);
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(RecordStatus::parse("ACTIVE"), Some(RecordStatus::Active));
        assert_eq!(RecordStatus::parse(" inactive "), Some(RecordStatus::Inactive));
        assert_eq!(RecordStatus::parse("deleted"), None);
    }
}
