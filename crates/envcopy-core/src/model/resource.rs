//! Copyable resources and their tag sets.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};

/// Lifecycle state reported by the provider for a copyable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// The provider reported nothing recognisable.
    #[default]
    Unknown,
    /// The object exists but is still being created, copied, or restored.
    Creating,
    /// The object is ready for use.
    Online,
    /// The provider reported a terminal failure.
    Failed,
}

impl ResourceState {
    /// Map a provider status string onto the lifecycle state.
    #[must_use]
    pub fn from_provider_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "online" | "ready" | "success" | "succeeded" | "available" => Self::Online,
            "creating" | "copying" | "restoring" | "pending" | "recovering" | "scaling" => {
                Self::Creating
            }
            "failed" | "aborted" | "suspect" | "offline" | "disabled" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Whether polling can stop on this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Online | Self::Failed)
    }
}

/// Unordered string-to-string tag map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Construct an empty tag set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Look up a tag value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up a tag value, treating blank values as absent.
    #[must_use]
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.trim().is_empty())
    }

    /// Insert or replace a tag, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a tag, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Whether a tag key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for Tags {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl IntoIterator for Tags {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A single copyable unit (database or blob container).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Object name.
    pub name: String,
    /// Tags currently attached to the object.
    #[serde(default)]
    pub tags: Tags,
    /// Measured size in bytes; zero when not yet measurable.
    #[serde(default)]
    pub size_bytes: u64,
    /// Provider lifecycle state.
    #[serde(default)]
    pub state: ResourceState,
}

impl ResourceDescriptor {
    /// Descriptor with no tags, zero size, and unknown state.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
            size_bytes: 0,
            state: ResourceState::Unknown,
        }
    }

    /// Replace the tag set.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Set the measured size.
    #[must_use]
    pub const fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Set the lifecycle state.
    #[must_use]
    pub const fn with_state(mut self, state: ResourceState) -> Self {
        self.state = state;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_maps_known_values() {
        assert_eq!(
            ResourceState::from_provider_status("Online"),
            ResourceState::Online
        );
        assert_eq!(
            ResourceState::from_provider_status("Copying"),
            ResourceState::Creating
        );
        assert_eq!(
            ResourceState::from_provider_status(" failed "),
            ResourceState::Failed
        );
        assert_eq!(
            ResourceState::from_provider_status("Paused"),
            ResourceState::Unknown
        );
    }

    #[test]
    fn terminal_states_stop_polling() {
        assert!(ResourceState::Online.is_terminal());
        assert!(ResourceState::Failed.is_terminal());
        assert!(!ResourceState::Creating.is_terminal());
        assert!(!ResourceState::Unknown.is_terminal());
    }

    #[test]
    fn tags_serialize_as_plain_map() {
        let tags: Tags = [("Owner", "data"), ("Environment", "qa2")]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&tags).expect("serialize");
        assert_eq!(json["Owner"], "data");
        assert_eq!(json["Environment"], "qa2");
    }

    #[test]
    fn blank_tag_values_are_treated_as_absent() {
        let mut tags = Tags::new();
        tags.insert("Owner", "  ");
        assert_eq!(tags.get("Owner"), Some("  "));
        assert!(tags.get_non_empty("Owner").is_none());
    }
}
