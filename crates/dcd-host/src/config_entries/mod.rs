//! Config Entries
//!
//! A config entry is one user-configured instance of an integration, with its
//! own immutable `data`, user-editable `options` and lifecycle state.
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking for migrations.

mod entry;
mod manager;

pub use entry::{ConfigEntry, ConfigEntryState};
pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, ListenerId,
    UnloadCallback, UpdateListener, STORAGE_KEY, STORAGE_MINOR_VERSION, STORAGE_VERSION,
};
