//! [Symbolic](https://docs.rs/symbolic) is a library written in Rust to inspect and rewrite
//! Microsoft PDB files for symbol servers. It consists of multiple largely independent crates
//! which are bundled together here.
//!
//! # What's in the package
//!
//! Symbolic provides the following functionality:
//!
//! - Reading and rewriting the MSF container of PDBs
//!   - The 7.00 container and the legacy 2.00 container
//!   - Indexed and named streams that can grow and shrink
//!   - Saving changes in place
//! - Source server (SRCSRV) streams
//!   - Evaluation of the variable language to source file URLs
//!   - Rendering of new streams
//! - Symbol server identifiers for PDBs, PE images and arbitrary files
//!
//! # Usage
//!
//! Add `symbolic` as a dependency to your `Cargo.toml`. The following features are available:
//!
//! - **`msf`** (default): The MSF container with its streams.
//! - **`srcsrv`** (default): Interpreting and rendering SRCSRV streams.
//! - **`identify`** (default): Recognizing symbol files and computing their identifiers. This
//!   implies `msf` and `srcsrv`.
//! - **`identify-async`**: Futures for the operations of `identify`, based on tokio.
//!
//! ## Minimal Rust Version
//!
//! This crate is known to require at least Rust 1.75.

#![warn(missing_docs)]

#[doc(inline)]
pub use symbolic_common as common;
#[doc(inline)]
#[cfg(feature = "identify")]
pub use symbolic_identify as identify;
#[doc(inline)]
#[cfg(feature = "msf")]
pub use symbolic_msf as msf;
#[doc(inline)]
#[cfg(feature = "srcsrv")]
pub use symbolic_srcsrv as srcsrv;
