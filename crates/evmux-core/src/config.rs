use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::event::{event_factory, Event, EventKind};
use crate::policy::{CollisionPolicy, PutPolicy};

/// Configuration of an [`EventStore`](crate::EventStore) and the events it
/// produces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How name collisions across sources are handled at registration.
    pub collision_policy: CollisionPolicy,
    /// How `put` handles a name that is already cached.
    pub put_policy: PutPolicy,
    /// Materialization strategy of produced events.
    pub event_kind: EventKind,
    /// Whether an event handed back to the store is reset and reused instead
    /// of allocating a fresh one.
    pub reuse_events: bool,
}

impl StoreConfig {
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Event factory matching this configuration.
    pub fn event_factory(&self) -> impl Fn(Option<Event>) -> Event + Copy + Send + Sync {
        event_factory(self.event_kind, self.put_policy, self.reuse_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.collision_policy, CollisionPolicy::FirstWins);
        assert_eq!(c.put_policy, PutPolicy::Replace);
        assert_eq!(c.event_kind, EventKind::Eager);
        assert!(!c.reuse_events);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StoreConfig::from_toml_str(
            r#"
            event_kind = "lazy"
            collision_policy = "reject"
            "#,
        )
        .unwrap();
        assert_eq!(c.event_kind, EventKind::Lazy);
        assert_eq!(c.collision_policy, CollisionPolicy::Reject);
        assert_eq!(c.put_policy, PutPolicy::Replace);
    }

    #[test]
    fn full_toml() {
        let c = StoreConfig::from_toml_str(
            r#"
            collision_policy = "first-wins"
            put_policy = "keep-original"
            event_kind = "eager"
            reuse_events = true
            "#,
        )
        .unwrap();
        assert_eq!(c.put_policy, PutPolicy::KeepOriginal);
        assert!(c.reuse_events);
    }

    #[test]
    fn bad_value_is_config_error() {
        let err = StoreConfig::from_toml_str("event_kind = \"greedy\"").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(&path, "reuse_events = true\n").unwrap();
        let c = StoreConfig::load(&path).unwrap();
        assert!(c.reuse_events);
        assert!(StoreConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn factory_follows_config() {
        let c = StoreConfig {
            event_kind: EventKind::Lazy,
            ..Default::default()
        };
        let factory = c.event_factory();
        assert_eq!(factory(None).kind(), EventKind::Lazy);
    }
}
