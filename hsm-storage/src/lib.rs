//! Compression codec, archiver, and `MachineStore` persistence trait for the
//! state-machine engine.
//!
//! [`compression`] deflates `payload`/`context`/`meta` fields above a
//! configured threshold and sniffs the zlib header on the way back in so
//! legacy uncompressed JSON still decodes. [`archive`] snapshots a machine
//! instance's full event sequence into one compressed blob keyed by
//! `root_event_id`. [`store`] is the persistence trait for archive rows,
//! plus an in-memory reference implementation.

pub mod archive;
pub mod compression;
pub mod store;

pub use archive::{ArchiveEntry, Archiver};
pub use compression::{CompressionCodec, CompressionStats};
pub use store::{InMemoryMachineStore, MachineStore};

pub use hsm_dsl::CompressionConfig;
