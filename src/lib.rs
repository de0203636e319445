//! Resilient-operation execution engine
//!
//! Aegis provides two layers:
//!
//! - [`RetryPolicy`]: a generic, reusable description of how many times,
//!   how far apart, and for which failures an operation should be retried,
//!   with observer callbacks per failed attempt. Blocking ([`RetryPolicy::run`])
//!   and suspending ([`RetryPolicy::run_async`]) execution share the same
//!   decision logic.
//! - [`ResilientStorage`]: filesystem operations wrapped in per-call retry
//!   policies tuned to each operation's known transient failure modes, with
//!   one-shot self-healing actions (create a missing parent directory,
//!   clear a read-only flag) applied on the first qualifying failure.
//!
//! The typical consumer is a build or artifact pipeline that must write
//! generated sources, diagnostics, and output binaries to disk while the
//! files are momentarily contended by scanners, editors, or a previous
//! process still letting go of a handle.

pub mod error;
pub mod retry;
pub mod storage;

// Re-export the common surface
pub use error::{FailureKind, StorageError, StorageResult};
pub use retry::RetryPolicy;
pub use storage::ResilientStorage;
