use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::temporal::Timestamp;
use crate::type_id::TypeId;

/// Identifies a cached entity type and the version of data held for it.
///
/// Two stamps are equal when their type identifiers match, regardless of
/// version: a stamp answers "which type" for set membership, and the
/// version is compared explicitly through [`VersionStamp::is_stale_against`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionStamp {
    /// The entity type this stamp describes.
    pub type_id: TypeId,
    /// Version of the data held for `type_id`.
    pub version: Timestamp,
}

impl VersionStamp {
    /// Create a stamp for `type_id` at `version`.
    pub fn new(type_id: TypeId, version: Timestamp) -> Self {
        Self { type_id, version }
    }

    /// A stamp for a type with no locally known version.
    pub fn unversioned(type_id: TypeId) -> Self {
        Self {
            type_id,
            version: Timestamp::MIN,
        }
    }

    /// Returns `true` if this (local) stamp is older than `server`.
    pub fn is_stale_against(&self, server: &VersionStamp) -> bool {
        self.version < server.version
    }
}

/// Staleness of a local stamp relative to a server-declared one.
///
/// An absent local stamp is always stale; otherwise the local version must be
/// strictly earlier than the server's.
pub fn is_stale(local: Option<&VersionStamp>, server: &VersionStamp) -> bool {
    match local {
        None => true,
        Some(local) => local.is_stale_against(server),
    }
}

impl PartialEq for VersionStamp {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for VersionStamp {}

impl Hash for VersionStamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}
