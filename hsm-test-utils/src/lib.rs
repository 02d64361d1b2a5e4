//! Test Utilities
//!
//! Centralized test infrastructure for the state-machine workspace:
//! - Proptest generators for context/event shapes
//! - Fixture `MachineDefinition`s for the named end-to-end scenarios
//! - Custom assertions for active leaves, context paths, and traces

pub mod assertions;
pub mod generators;
pub mod scenarios;

/// Install a `tracing-subscriber` `fmt` layer honoring `RUST_LOG`, once per
/// process. Tests call this to see `tracing` output from the engine/storage
/// crates; library crates themselves never do this.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
