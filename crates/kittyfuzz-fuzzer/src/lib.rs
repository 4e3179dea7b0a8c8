//! Session drivers for kittyfuzz.
//!
//! A driver walks a [`kittyfuzz_model::Template`]'s mutation stream and
//! orchestrates the target/controller/monitor trio around every test:
//! pre-test, render, deliver, post-test, collect the report, judge it,
//! persist progress. Sessions are resumable by index through a
//! [`kittyfuzz_data::SessionStore`], guarded by the template hash.
//!
//! [`ServerFuzzer`] pushes payloads at server-style SUTs;
//! [`ClientFuzzer`] serves payloads to client-style SUTs through a
//! stage-matching [`MutationProvider`].

#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
mod pause;
mod server;
mod session;
mod test_list;

pub use client::{ClientFuzzer, MutationProvider, STAGE_ANY};
pub use config::FuzzerConfig;
pub use error::SessionError;
pub use pause::{PauseGate, ShutdownFlag};
pub use server::ServerFuzzer;
pub use session::SessionSummary;
pub use test_list::{RangesList, StartEndList, TestList};
