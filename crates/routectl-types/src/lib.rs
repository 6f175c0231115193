//! Shared domain types for routectl: the config document model, dotted-path
//! addressing, the snapshot metadata shape, the event vocabulary, and the
//! closed error taxonomy every operation reports through.

pub mod document;
pub mod error;
pub mod event;
pub mod path;
pub mod snapshot;

pub use document::{ConfigBundle, ConfigDocument, ListMap, OptionMap, Section};
pub use error::RouterConfError;
pub use event::{EventKind, RouterEvent};
pub use path::DottedPath;
pub use snapshot::{Snapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
