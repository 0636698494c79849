//! Request identity and page metadata.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique request identifier for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{:x}-{:x}",
            nanos,
            seq.wrapping_mul(0x517c_c1b7_2722_0a95)
        ))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page metadata handed to the head function (title, description, ...).
pub type Meta = BTreeMap<String, String>;

/// Build a [`Meta`] map from string pairs.
pub fn meta_from<I, K, V>(pairs: I) -> Meta
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_request_id_from_string() {
        let id = RequestId::from_string("req-1");
        assert_eq!(id.to_string(), "req-1");
    }

    #[test]
    fn test_meta_from_pairs() {
        let meta = meta_from([("title", "Home"), ("description", "Landing")]);
        assert_eq!(meta.get("title").map(String::as_str), Some("Home"));
        assert_eq!(meta.len(), 2);
    }
}
