//! Common test utilities for cursor integration tests
#![allow(dead_code)]

use quarry_cursor::CursorRepository;
use quarry_shutdown::SoftShutdownFlag;
use serde_json::{Value, json};

/// Repository over a throwaway database with default config
pub fn repository() -> CursorRepository {
    CursorRepository::new("test", SoftShutdownFlag::new())
}

/// Rows 1..=n as JSON numbers
pub fn rows(n: usize) -> Vec<Value> {
    (1..=n).map(|i| json!(i)).collect()
}

/// Documents shaped like real query output
pub fn documents(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| json!({"_key": format!("doc{}", i), "value": i}))
        .collect()
}
