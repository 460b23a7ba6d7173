//! Ordered key/bytes side channel attached to a body.
//!
//! Filters append entries to mark a message (for example to record which
//! filter touched it). The dispatcher carries extensions along with the body
//! and never interprets them.

use bytes::Bytes;

/// Ordered list of `(key, value)` extension entries.
///
/// Keys may repeat; insertion order is preserved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extensions(Vec<(u32, Bytes)>);

impl Extensions {
    /// Append an entry.
    pub fn push(&mut self, key: u32, value: impl Into<Bytes>) { self.0.push((key, value.into())); }

    /// Iterate the values stored under `key` in insertion order.
    pub fn get_all(&self, key: u32) -> impl Iterator<Item = &Bytes> + '_ {
        self.0
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Iterate every entry in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Bytes)> + '_ {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns `true` when no entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::Extensions;

    #[test]
    fn repeated_keys_keep_insertion_order() {
        let mut ext = Extensions::default();
        ext.push(500, &b"first"[..]);
        ext.push(7, &b"other"[..]);
        ext.push(500, &b"second"[..]);

        let values: Vec<_> = ext.get_all(500).map(|v| v.as_ref()).collect();
        assert_eq!(values, vec![&b"first"[..], &b"second"[..]]);
        assert_eq!(ext.len(), 3);
    }

    #[test]
    fn missing_key_yields_nothing() {
        let ext = Extensions::default();
        assert!(ext.is_empty());
        assert_eq!(ext.get_all(1).count(), 0);
    }
}
