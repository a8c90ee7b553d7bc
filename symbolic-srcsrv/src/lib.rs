//! Interpreting and rendering SRCSRV streams.
//!
//! Source-indexed PDBs carry a named stream called `srcsrv`. It is a small text format
//! that declares variables and lists every compiled source file as a record. Evaluating
//! the `SRCSRVTRG` variable for a record yields the location the original source file can
//! be retrieved from, such as a URL of a version control server.
//!
//! ```text
//! SRCSRV: ini ------------------------------------------------
//! VERSION=2
//! VERCTRL=http
//! SRCSRV: variables ------------------------------------------
//! HTTP_ALIAS=http://example.org/src
//! SRCSRVTRG=%HTTP_ALIAS%/%var2%
//! SRCSRV: source files ---------------------------------------
//! c:\build\src\main.cs*src/main.cs
//! SRCSRV: end ------------------------------------------------
//! ```
//!
//! [`SrcSrvStream`] interprets such a stream, [`parse_source_information`] is a shorthand
//! for the common case, and [`SrcSrvWriter`] renders a new one.

#![warn(missing_docs)]

mod error;
mod expr;
mod source;
mod stream;
mod writer;

pub use crate::error::{SrcSrvError, SrcSrvErrorKind};
pub use crate::expr::{Expr, Expression, Function};
pub use crate::source::SourceInformation;
pub use crate::stream::{parse_source_information, ParseOptions, SrcSrvStream, TARGET_VARIABLE};
pub use crate::writer::SrcSrvWriter;
