//! Memory-backed prebuffering stream filter.
//!
//! Sits in front of a seekable byte [`Source`] and exposes `read`, `peek`,
//! `seek`, and size/position queries backed by a background producer
//! thread that fills a growable, block-indexed in-memory cache ahead of
//! the reader. See `SPEC_FULL.md` for the full design.
//!
//! ```no_run
//! use membuf::{MembufOptions, PrebufferFilter, Source};
//! # use std::sync::Arc;
//! # fn open(source: Arc<dyn Source>) -> membuf::MembufResult<()> {
//! let mut filter = PrebufferFilter::open(source, MembufOptions::enabled())?;
//! let mut buf = [0u8; 4096];
//! let n = filter.read(&mut buf)?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```

mod block;
mod block_array;
mod config;
mod error;
mod filter;
mod producer;
mod reader;
mod seek;
mod source;
mod state;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{MembufOptions, DEFAULT_BLOCK_SIZE, DEFAULT_BYTES_PER_READ, DEFAULT_SHORT_SEEK_RANGE};
pub use error::{MembufError, MembufResult};
pub use filter::PrebufferFilter;
pub use reader::Peeked;
pub use source::Source;
