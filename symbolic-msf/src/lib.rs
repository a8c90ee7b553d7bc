//! Reading and rewriting the multi-stream file (MSF) container of Microsoft PDBs.
//!
//! A PDB is a small page-based file system. Its directory lists numbered streams, each
//! stored in an arbitrary sequence of pages, and a free page map records which pages
//! are unused. Stream 1 holds the PDB info header (version, signature, age and GUID) as
//! well as a table of named streams, such as `/names` or `srcsrv`.
//!
//! # Functionality
//!
//! * Open a container from any `Read + Write + Seek` source with [`MsfFile::open`]. Both
//!   the current 7.00 container ([`Pdb70File`]) and the legacy 2.00 container
//!   ([`Pdb20File`]) are supported.
//! * Access streams by index with [`MsfFile::stream`] or by name with
//!   [`MsfFile::named_stream`]. The returned [`VirtualStream`] implements the `std::io`
//!   traits and can grow or shrink the stream.
//! * Write all changes back with [`MsfFile::save`].
//!
//! Only the container layer is interpreted. The contents of the debug information
//! streams are opaque to this crate.
//!
//! ## Example
//!
//! ```
//! use std::io::{Cursor, Read, Write};
//!
//! use symbolic_common::Sniff;
//! use symbolic_msf::Pdb70File;
//! use symbolic_testutils::MsfBuilder;
//!
//! let image = MsfBuilder::new().named_stream("/names", b"names").build();
//!
//! let Sniff::Recognized(mut pdb) = Pdb70File::open(Cursor::new(image)).unwrap() else {
//!     panic!("not a PDB");
//! };
//!
//! pdb.named_stream("srcsrv").write_all(b"SRCSRV: ini ---").unwrap();
//! pdb.save().unwrap();
//!
//! let mut contents = String::new();
//! pdb.named_stream("srcsrv").read_to_string(&mut contents).unwrap();
//! assert_eq!(contents, "SRCSRV: ini ---");
//! ```

#![warn(missing_docs)]

mod bitset;
mod error;
mod file;
mod format;
mod stream;

pub use crate::bitset::{log2, BitSet};
pub use crate::error::{MsfError, MsfErrorKind};
pub use crate::file::{MsfFile, OpenOptions, Pdb20File, Pdb70File, INFO_STREAM};
pub use crate::format::{
    Msf20, Msf70, MsfFormat, MsfHeader, PdbInfo, MSF20_MAGIC, MSF70_MAGIC, NIL_STREAM_SIZE,
};
pub use crate::stream::VirtualStream;
