//! Identifying symbol files for symbol servers.
//!
//! A symbol server stores files under a key derived from their contents. This crate
//! recognizes the file type and computes that key:
//!
//!  - **PDB** (7.00 and 2.00 containers): the GUID or signature, followed by the age.
//!    PDBs also expose their source server information, which can be replaced and saved.
//!  - **PE** images: the link timestamp and the image size.
//!  - Any other file: a 128-bit hash of the contents.
//!
//! Providers are tried in order by a [`ProviderRegistry`]. A provider that does not
//! recognize its input hands the source back as [`Sniff::NotRecognized`] so the next one
//! can try.
//!
//! ## Example
//!
//! ```
//! use std::io::Cursor;
//!
//! use symbolic_common::{CancellationToken, Sniff};
//! use symbolic_identify::ProviderRegistry;
//!
//! let source = Box::new(Cursor::new(b"not a symbol file".to_vec()));
//! let registry = ProviderRegistry::default();
//!
//! let result = registry.identify(source, &CancellationToken::new()).unwrap();
//! let Sniff::Recognized(metadata) = result else {
//!     unreachable!("the content hash recognizes everything");
//! };
//! assert_eq!(metadata.identifier().len(), 32);
//! assert!(!metadata.supports_source_server_info());
//! ```
//!
//! With the `async` feature, the [`tasks`] module offers the same operations as futures.
//!
//! [`Sniff::NotRecognized`]: symbolic_common::Sniff::NotRecognized

#![warn(missing_docs)]

mod base;
mod error;
mod fallback;
mod mz;
mod pdb;
mod registry;
#[cfg(feature = "async")]
pub mod tasks;

pub use crate::base::{BoxedSource, ReadResult, Source, SymbolMetadata, SymbolMetadataProvider};
pub use crate::error::{IdentifyError, IdentifyErrorKind};
pub use crate::fallback::FallbackProvider;
pub use crate::mz::MzProvider;
pub use crate::pdb::{PdbMetadata, PdbProvider, SRCSRV_STREAM};
pub use crate::registry::ProviderRegistry;
