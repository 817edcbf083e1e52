//! Conditional HTTP mirroring for capstan.
//!
//! One concern lives here: given a URL and a local path, fetch the file
//! only if the remote copy changed, write it atomically, and keep the
//! remote modification time on disk so the next run can ask the same
//! question. The engine consumes this through [`MirrorFetcher`]; the
//! transport is abstracted behind [`HttpClient`] so tests can script
//! responses without a network.

mod client;
mod error;
mod mirror;

pub use client::{HttpClient, HttpResponse};
pub use error::{Error, Result};
pub use mirror::{MirrorFailure, MirrorFetcher, MirrorOutcome};

#[cfg(feature = "reqwest")]
pub use client::ReqwestClient;
