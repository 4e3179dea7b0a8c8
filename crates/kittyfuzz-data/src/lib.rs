//! Reports, session records and session stores for kittyfuzz.
//!
//! The driver records one [`Report`] per interesting test and a
//! [`SessionInfo`] snapshot per iteration into an opaque [`SessionStore`].
//! Stores are keyed-value and engine-agnostic; the stored template hash is
//! the only compatibility guard between runs.

#![forbid(unsafe_code)]

mod report;
mod session;
mod store;

pub use report::{Report, ReportValue, Status};
pub use session::SessionInfo;
pub use store::{JsonFileStore, MemoryStore, SessionStore, StoreError};
