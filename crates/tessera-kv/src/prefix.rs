//! Prefixed sub-views over a backend.

use std::sync::Arc;

use crate::{prefix_upper_bound, KvBackend, KvPair, Result, WriteBatch};

/// A view of a parent backend restricted to keys under a fixed prefix.
///
/// Keys are transparently prefixed on writes and stripped on reads, so a
/// substore operating through the view sees a private keyspace.
pub struct PrefixedKv {
    parent: Arc<dyn KvBackend>,
    prefix: Vec<u8>,
}

impl PrefixedKv {
    /// Creates a view of `parent` under `prefix`.
    pub fn new(parent: Arc<dyn KvBackend>, prefix: impl Into<Vec<u8>>) -> Self {
        Self { parent, prefix: prefix.into() }
    }

    /// The view's prefix bytes.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    fn strip(&self, pairs: Vec<KvPair>) -> Vec<KvPair> {
        pairs
            .into_iter()
            .map(|(k, v)| (k[self.prefix.len()..].to_vec(), v))
            .collect()
    }
}

impl KvBackend for PrefixedKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.parent.get(&self.full_key(key))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.parent.set(&self.full_key(key), value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.parent.delete(&self.full_key(key))
    }

    fn scan(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Vec<KvPair>> {
        let lower = self.full_key(start.unwrap_or(&[]));
        let upper = match end {
            Some(e) => Some(self.full_key(e)),
            // Unbounded above within the view: everything under the prefix.
            None => prefix_upper_bound(&self.prefix),
        };

        let pairs = self.parent.scan(Some(&lower), upper.as_deref())?;
        Ok(self.strip(pairs))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut prefixed = WriteBatch::new();
        for op in batch.ops() {
            match op {
                crate::BatchOp::Set(k, v) => prefixed.set(self.full_key(k), v.clone()),
                crate::BatchOp::Delete(k) => prefixed.delete(self.full_key(k)),
            }
        }
        self.parent.write_batch(prefixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKv;

    fn view(prefix: &[u8]) -> (Arc<MemoryKv>, PrefixedKv) {
        let parent = Arc::new(MemoryKv::new());
        let view = PrefixedKv::new(parent.clone(), prefix.to_vec());
        (parent, view)
    }

    #[test]
    fn test_keys_are_prefixed_in_parent() {
        let (parent, view) = view(b"s/k:acc/");
        view.set(b"balance", b"10").unwrap();

        assert_eq!(parent.get(b"s/k:acc/balance").unwrap(), Some(b"10".to_vec()));
        assert_eq!(view.get(b"balance").unwrap(), Some(b"10".to_vec()));
    }

    #[test]
    fn test_views_are_isolated() {
        let parent = Arc::new(MemoryKv::new());
        let acc = PrefixedKv::new(parent.clone(), b"s/k:acc/".to_vec());
        let kv = PrefixedKv::new(parent.clone(), b"s/k:kv/".to_vec());

        acc.set(b"x", b"1").unwrap();
        kv.set(b"x", b"2").unwrap();

        assert_eq!(acc.get(b"x").unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get(b"x").unwrap(), Some(b"2".to_vec()));

        acc.delete(b"x").unwrap();
        assert_eq!(kv.get(b"x").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_scan_strips_prefix() {
        let (_, view) = view(b"p/");
        view.set(b"a", b"1").unwrap();
        view.set(b"b", b"2").unwrap();

        let pairs = view.scan(None, None).unwrap();
        let keys: Vec<_> = pairs.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"b".as_slice()]);
    }

    #[test]
    fn test_scan_does_not_leak_sibling_views() {
        let parent = Arc::new(MemoryKv::new());
        let a = PrefixedKv::new(parent.clone(), b"s/k:a/".to_vec());
        parent.set(b"s/k:ab/x", b"other").unwrap();
        a.set(b"x", b"mine").unwrap();

        let pairs = a.scan(None, None).unwrap();
        assert_eq!(pairs, vec![(b"x".to_vec(), b"mine".to_vec())]);
    }

    #[test]
    fn test_batch_through_view() {
        let (parent, view) = view(b"v/");
        let mut batch = WriteBatch::new();
        batch.set(b"k".to_vec(), b"1".to_vec());
        view.write_batch(batch).unwrap();

        assert_eq!(parent.get(b"v/k").unwrap(), Some(b"1".to_vec()));
    }
}
