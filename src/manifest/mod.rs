//! Self-executing job manifest
//!
//! The manifest is the durable record of a run: a `#!` header naming the
//! worker pool invocation followed by one line per job. It is only ever
//! appended to, so an interrupted run can be resumed by appending more jobs
//! or by replaying it.

pub mod header;
pub mod writer;

pub use header::{InvocationTemplate, PLACEHOLDER};
pub use writer::{Manifest, ManifestHandle, ManifestMessage, ManifestStats, ManifestSummary, ManifestWriter};
