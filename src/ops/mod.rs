//! Store operations
//!
//! Every operation takes the [`StoreContext`](crate::context::StoreContext)
//! and returns a [`Result`](crate::error::Result).

pub mod analyze;
pub mod compare;
pub mod files;
pub mod mirror;
pub mod sync;
pub mod verify;

pub use analyze::{analyze, VersionAnalysis};
pub use compare::{compare, CompareOptions, FileChange, FileSize, VersionComparison};
pub use files::{get_file, get_file_tree, list_files, FileOptions, SourceMode};
pub use mirror::{
    mirror, MirrorCounts, MirrorFileError, MirrorFiles, MirrorMetrics, MirrorOptions, MirrorReport,
    MirrorSummary, MirrorVersionError, VersionMirrorReport,
};
pub use sync::{sync, SyncOptions, SyncResult};
pub use verify::{verify, VerifyResult};
