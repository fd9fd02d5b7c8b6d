use std::collections::HashMap;

use dcache_types::{is_stale, Timestamp, TypeId, VersionStamp};

/// Outcome of comparing a local snapshot catalogue with a server one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Negotiation {
    /// Server stamps the local side lacks or holds an older version of.
    pub stale: Vec<VersionStamp>,
    /// Server stamps the local side already holds at the same or a newer version.
    pub current: Vec<VersionStamp>,
}

/// Decides which snapshots a delta transfer has to carry.
pub struct SnapshotNegotiation;

impl SnapshotNegotiation {
    /// Server stamps that are stale locally, in server order.
    pub fn stale(local: &[VersionStamp], server: &[VersionStamp]) -> Vec<VersionStamp> {
        Self::negotiate(local, server).stale
    }

    /// Split the server catalogue into stale and current stamps.
    pub fn negotiate(local: &[VersionStamp], server: &[VersionStamp]) -> Negotiation {
        let local: HashMap<&TypeId, Timestamp> =
            local.iter().map(|s| (&s.type_id, s.version)).collect();
        let mut negotiation = Negotiation::default();
        for stamp in server {
            let held = local
                .get(&stamp.type_id)
                .map(|v| VersionStamp::new(stamp.type_id.clone(), *v));
            if is_stale(held.as_ref(), stamp) {
                negotiation.stale.push(stamp.clone());
            } else {
                negotiation.current.push(stamp.clone());
            }
        }
        negotiation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(name: &str, version: i64) -> VersionStamp {
        VersionStamp::new(TypeId::new(name), Timestamp::from_millis(version))
    }

    #[test]
    fn missing_and_older_are_stale() {
        let local = vec![stamp("a.Old", 1), stamp("a.Same", 5), stamp("a.Newer", 9)];
        let server = vec![
            stamp("a.Old", 2),
            stamp("a.Same", 5),
            stamp("a.Newer", 3),
            stamp("a.Missing", 1),
        ];
        let stale = SnapshotNegotiation::stale(&local, &server);
        let names: Vec<_> = stale.iter().map(|s| s.type_id.qualified_name()).collect();
        assert_eq!(names, ["a.Old", "a.Missing"]);
    }

    #[test]
    fn negotiate_partitions_server_catalogue() {
        let local = vec![stamp("a.X", 1)];
        let server = vec![stamp("a.X", 1), stamp("a.Y", 1)];
        let n = SnapshotNegotiation::negotiate(&local, &server);
        assert_eq!(n.current.len(), 1);
        assert_eq!(n.stale.len(), 1);
        assert_eq!(n.stale[0].type_id, TypeId::new("a.Y"));
    }

    #[test]
    fn empty_server_means_nothing_to_send() {
        assert!(SnapshotNegotiation::stale(&[stamp("a.X", 1)], &[]).is_empty());
    }
}
