pub mod applier;
pub mod reader;
pub mod row_extract;
pub mod snapshot_builder;
pub mod snapshot_source;
pub mod source;
pub mod state_file;
pub mod sync_coordinator;

pub use applier::{BinlogApplier, ReplicationCounters};
pub use reader::{BinlogReaderConfig, BinlogReaderHandle, ReaderState};
pub use snapshot_builder::{SnapshotBuilder, SnapshotOutcome, SnapshotProgress};
pub use snapshot_source::SnapshotSource;
pub use source::{ColumnMeta, DdlEvent, RawCell, RowAction, RowEvent, SourceConnection, SourceEvent, TableMapEvent};
pub use sync_coordinator::{JobStatus, RestartHook, RestartOutcome, SyncCoordinator, SyncJob};
