pub mod allergen; // Trigger registry, matcher, fail-safe scorer
pub mod analysis; // Collaborator client, completion, orchestration
pub mod config;
pub mod ingredients; // Group intersection + OCR fallback split

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG`, falling back to [`config::default_log_filter`]. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
