use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Version timestamp attached to a snapshot of one entity type.
///
/// Wall-clock milliseconds since the UNIX epoch. The server assigns these when
/// it builds a snapshot; the client only compares them. [`Timestamp::MIN`]
/// stands in for "no local version".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    millis: i64,
}

impl Timestamp {
    /// The smallest representable version. Sorts before every real version.
    pub const MIN: Self = Self { millis: i64::MIN };

    /// Create a timestamp from milliseconds since the UNIX epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Timestamp for the current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self { millis }
    }

    /// Milliseconds since the UNIX epoch.
    pub const fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Returns `true` if this is [`Timestamp::MIN`].
    pub fn is_min(&self) -> bool {
        self.millis == i64::MIN
    }

    /// Returns `true` if this timestamp is strictly later than `other`.
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }

    /// Returns `true` if this timestamp is strictly earlier than `other`.
    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_min() {
            write!(f, "Timestamp(MIN)")
        } else {
            write!(f, "Timestamp({}ms)", self.millis)
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_min() {
            write!(f, "min")
        } else {
            write!(f, "{}", self.millis)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_millis() {
        let a = Timestamp::from_millis(100);
        let b = Timestamp::from_millis(200);
        assert!(a < b);
        assert!(a.is_before(&b));
        assert!(b.is_after(&a));
    }

    #[test]
    fn min_is_smallest() {
        assert!(Timestamp::MIN < Timestamp::from_millis(i64::MIN + 1));
        assert!(Timestamp::MIN < Timestamp::from_millis(0));
        assert!(Timestamp::MIN.is_min());
    }

    #[test]
    fn equal_timestamps() {
        let a = Timestamp::from_millis(42);
        let b = Timestamp::from_millis(42);
        assert_eq!(a, b);
        assert!(!a.is_after(&b));
        assert!(!a.is_before(&b));
    }

    #[test]
    fn now_produces_reasonable_timestamp() {
        // After 2020-01-01.
        assert!(Timestamp::now().as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn serde_roundtrip() {
        let ts = Timestamp::from_millis(1_234_567_890);
        let json = serde_json::to_string(&ts).unwrap();
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", Timestamp::from_millis(1000)), "1000");
        assert_eq!(format!("{}", Timestamp::MIN), "min");
    }
}
