use serde::{Deserialize, Serialize};

/// What happens when two sources provide a collection with the same name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// The source registered first serves the name; later ones are shadowed.
    /// Every collision is logged.
    #[default]
    FirstWins,
    /// Registration of the colliding source fails.
    Reject,
}

/// What happens when a collection is put into an event under a name that is
/// already cached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PutPolicy {
    /// The new collection replaces the cached one.
    #[default]
    Replace,
    /// The cached collection stays; the new one is dropped.
    KeepOriginal,
    /// The put fails with [`CoreError::CollectionExists`](crate::CoreError::CollectionExists).
    Reject,
}
