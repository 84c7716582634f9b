pub mod codec;
pub mod scheduler;

pub use codec::{Manifest, SnapshotCodec};
pub use scheduler::{load_snapshot, prune_auto_snapshots, save_snapshot, SnapshotScheduler};
