//! In-memory KV backend.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::{BatchOp, KvBackend, KvPair, Result, WriteBatch};

/// Reference in-memory backend: an ordered map behind a read/write lock.
///
/// Batches are applied under a single write-lock acquisition, which is the
/// atomicity boundary.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the backend holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn scan(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Vec<KvPair>> {
        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));

        Ok(self
            .inner
            .read()
            .range::<Vec<u8>, _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut map = self.inner.write();
        for op in batch.ops() {
            match op {
                BatchOp::Set(key, value) => {
                    map.insert(key.clone(), value.clone());
                }
                BatchOp::Delete(key) => {
                    map.remove(key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get(b"k").unwrap(), None);

        kv.set(b"k", b"v").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));

        kv.delete(b"k").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_scan_range_is_half_open() {
        let kv = MemoryKv::new();
        for key in [b"a", b"b", b"c", b"d"] {
            kv.set(key, b"1").unwrap();
        }

        let pairs = kv.scan(Some(b"b"), Some(b"d")).unwrap();
        let keys: Vec<_> = pairs.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"b".as_slice(), b"c".as_slice()]);
    }

    #[test]
    fn test_scan_prefix() {
        let kv = MemoryKv::new();
        kv.set(b"s/k:acc/x", b"1").unwrap();
        kv.set(b"s/k:acc/y", b"2").unwrap();
        kv.set(b"s/k:kv/x", b"3").unwrap();

        let pairs = kv.scan_prefix(b"s/k:acc/").unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_batch_applies_in_order() {
        let kv = MemoryKv::new();
        let mut batch = WriteBatch::new();
        batch.set(b"a".to_vec(), b"1".to_vec());
        batch.set(b"b".to_vec(), b"2".to_vec());
        batch.delete(b"a".to_vec());
        kv.write_batch(batch).unwrap();

        assert_eq!(kv.get(b"a").unwrap(), None);
        assert_eq!(kv.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_scan_snapshot_survives_mutation() {
        let kv = MemoryKv::new();
        kv.set(b"a", b"1").unwrap();
        let snapshot = kv.scan(None, None).unwrap();
        kv.delete(b"a").unwrap();
        assert_eq!(snapshot.len(), 1);
    }
}
