//! Prometheus metrics for the cursor subsystem.
//!
//! Two gauges cover the operational questions that matter during incident
//! review and soft shutdown: how many cursors are open, and how much
//! memory they pin. Both aggregate across all databases.

use prometheus::{IntGauge, Registry};
use std::sync::{LazyLock, Once};

/// Registry for the cursor metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Cursors currently registered, the leased ones included.
pub static OPEN_CURSORS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("quarry_open_cursors", "Current number of open result cursors")
        .expect("metric creation failed")
});

/// Estimated bytes held by open cursors.
pub static CURSOR_MEMORY_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "quarry_cursor_memory_bytes",
        "Estimated memory held by open result cursors",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register the cursor metrics with the registry.
///
/// Idempotent - subsequent calls after the first are no-ops, so every
/// repository constructor may call it.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(OPEN_CURSORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CURSOR_MEMORY_BYTES.clone()))
            .expect("metric registration failed");
    });
}
