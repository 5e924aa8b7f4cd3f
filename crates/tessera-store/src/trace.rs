//! KV operation tracing.
//!
//! When a tracer is set on the multi-store, `get_kv_store` hands out
//! substores wrapped in a trace adapter that records every operation as a
//! JSON line on the configured writer, tagged with the merged tracing
//! context.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use snafu::ResultExt;

use tessera_kv::KvPair;

use crate::error::{Result, TraceWriteSnafu};
use crate::substore::KvStore;

/// Shared sink for trace records.
pub type TraceWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Context map merged into every trace record.
pub type TraceContext = BTreeMap<String, String>;

const OP_READ: &str = "read";
const OP_WRITE: &str = "write";
const OP_DELETE: &str = "delete";
const OP_ITER: &str = "iter";

#[derive(Serialize)]
struct TraceRecord<'a> {
    operation: &'static str,
    key: String,
    value: String,
    metadata: &'a TraceContext,
}

/// A substore wrapped with operation tracing.
pub struct TraceKvStore {
    inner: Arc<dyn KvStore>,
    writer: TraceWriter,
    context: TraceContext,
}

impl TraceKvStore {
    /// Wraps a store with a trace writer and context.
    pub fn new(inner: Arc<dyn KvStore>, writer: TraceWriter, context: TraceContext) -> Self {
        Self { inner, writer, context }
    }

    fn write_record(&self, operation: &'static str, key: &[u8], value: &[u8]) -> Result<()> {
        let record = TraceRecord {
            operation,
            key: hex::encode(key),
            value: hex::encode(value),
            metadata: &self.context,
        };
        // Serializing a string/map record cannot fail; the writer can.
        let line = serde_json::to_string(&record).unwrap_or_default();

        let mut writer = self.writer.lock();
        writeln!(writer, "{line}").context(TraceWriteSnafu)
    }
}

impl KvStore for TraceKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.inner.get(key)?;
        self.write_record(OP_READ, key, value.as_deref().unwrap_or_default())?;
        Ok(value)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_record(OP_WRITE, key, value)?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.write_record(OP_DELETE, key, &[])?;
        self.inner.delete(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let pairs = self.inner.scan_prefix(prefix)?;
        for (key, value) in &pairs {
            self.write_record(OP_ITER, key, value)?;
        }
        Ok(pairs)
    }
}
