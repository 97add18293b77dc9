//! Bucketeer: object-storage sync for locally stored files
//!
//! Two budget-bounded jobs keep a local file catalog and an S3-compatible
//! bucket in step:
//! - Upload Sweep (pending files go up once, the locator is written back)
//! - Deletion Sweep (queued remote objects are removed and verified gone)
//!
//! Text detection on synced images runs on demand against the vision service.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod remote;
pub mod scheduler;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{Result, SyncError};
pub use state::{LocalStores, SharedContext, SyncContext};
pub use scheduler::{run_locked, Scheduler};
pub use engine::{
    forget_file,
    run_deletion_sweep,
    run_upload_sweep,
    DetectOptions,
    DetectedText,
    Job,
    SweepReport,
    SweepStatus,
    TextDetector,
    Uploader,
};
pub use storage::{FileCatalog, FileRecord, DeletionQueue};
