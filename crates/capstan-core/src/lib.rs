//! The capstan mirror synchronization engine.
//!
//! One [`MirrorSession`] is created per run and discarded afterwards; the
//! local mirror tree itself is the only durable state. A run stages the
//! three fixed index files, decides from them whether anything changed,
//! mirrors the minimal set of archives the package index calls for (each
//! with its sibling `CHECKSUMS` file), installs the staged indices, writes
//! the `RECENT` change manifest, and finally deletes whatever the index no
//! longer wants.
//!
//! The engine is strictly sequential: every fetch and filesystem step
//! completes before the next begins, and the per-file mark map relies on
//! that ordering.

mod clean;
mod config;
mod error;
mod filter;
mod index;
mod session;

pub use config::{LogLevel, MirrorConfig};
pub use error::{Error, Result};
pub use filter::{Filters, Rule};
pub use index::{
    AUTHOR_INDEX, FIXED_INDICES, IndexEntry, MODULE_INDEX, PACKAGE_INDEX, PackageIndex,
    mirror_list,
};
pub use session::{Mirror, MirrorFileOptions, MirrorMark, MirrorSession, RECENT_FILE};
