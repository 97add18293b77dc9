// FILE: src/core/mod.rs
pub mod uri;
pub mod keys;
pub mod budget;
pub mod job_lock;

pub use uri::{parse_locator, object_url, ObjectLocation};
pub use keys::derive_key;
pub use budget::TimeBudget;
pub use job_lock::JobLock;
