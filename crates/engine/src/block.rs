//! Result blocks
//!
//! Executions hand rows to the cursor layer one block at a time. Rows are
//! opaque structured values; the cursor layer never inspects them beyond
//! counting and size estimation.

use serde_json::Value;

/// One block of result rows produced by a single execution step
#[derive(Debug, Clone, PartialEq)]
pub struct ItemBlock {
    rows: Vec<Value>,
}

impl ItemBlock {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Value> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Best-effort bytes held by this block
    pub fn memory_usage(&self) -> usize {
        self.rows.iter().map(estimated_size).sum()
    }
}

/// Best-effort heap footprint of a structured value
///
/// Counts one node per value plus string payloads. Good enough for memory
/// accounting and batch budgets; not an exact allocator measurement.
pub fn estimated_size(value: &Value) -> usize {
    let children = match value {
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(estimated_size).sum(),
        Value::Object(map) => map.iter().map(|(k, v)| k.len() + estimated_size(v)).sum(),
        _ => 0,
    };
    std::mem::size_of::<Value>() + children
}
