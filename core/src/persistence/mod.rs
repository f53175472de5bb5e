//! Durable mirroring of a store into a key-value backend.
//!
//! Stored values are [`PersistenceEnvelope`]s: schema version, save time and
//! the state tree, optionally gzip-compressed. Envelopes older than the
//! configured schema go through [`Migrations`]; newer ones are refused.

mod backend;
mod envelope;
mod manager;
mod migration;

pub use backend::{MemoryStorage, StorageBackend};
pub use envelope::{decode, decode_value, encode, PersistenceEnvelope, COMPRESSED_PREFIX};
pub use manager::{PersistenceStats, StatePersistenceManager};
pub use migration::Migrations;
