use std::error::Error;
use std::fmt;
use std::io;

use thiserror::Error;

use symbolic_common::Cancelled;
use symbolic_msf::{MsfError, MsfErrorKind};
use symbolic_srcsrv::{SrcSrvError, SrcSrvErrorKind};

/// The kind of an [`IdentifyError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentifyErrorKind {
    /// A recognized PDB could not be loaded or written.
    Msf,

    /// The source server stream could not be read or written.
    SrcSrv,

    /// Reading or writing the source failed.
    Io,

    /// The file type does not carry source server information.
    NotSupported,

    /// The operation was aborted through its cancellation token.
    Cancelled,
}

impl fmt::Display for IdentifyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Msf => write!(f, "invalid pdb container"),
            Self::SrcSrv => write!(f, "invalid source server stream"),
            Self::Io => write!(f, "failed to access symbol file"),
            Self::NotSupported => write!(f, "source server information is not supported"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

/// An error when identifying or updating a symbol file.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct IdentifyError {
    kind: IdentifyErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl IdentifyError {
    /// Creates a new identify error from a known kind of error as well as an arbitrary
    /// error payload.
    pub fn new<E>(kind: IdentifyErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`IdentifyErrorKind`] for this error.
    pub fn kind(&self) -> IdentifyErrorKind {
        self.kind
    }
}

impl From<IdentifyErrorKind> for IdentifyError {
    fn from(kind: IdentifyErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<MsfError> for IdentifyError {
    fn from(source: MsfError) -> Self {
        let kind = match source.kind() {
            MsfErrorKind::Cancelled => IdentifyErrorKind::Cancelled,
            _ => IdentifyErrorKind::Msf,
        };
        Self::new(kind, source)
    }
}

impl From<SrcSrvError> for IdentifyError {
    fn from(source: SrcSrvError) -> Self {
        let kind = match source.kind() {
            SrcSrvErrorKind::Cancelled => IdentifyErrorKind::Cancelled,
            _ => IdentifyErrorKind::SrcSrv,
        };
        Self::new(kind, source)
    }
}

impl From<io::Error> for IdentifyError {
    fn from(source: io::Error) -> Self {
        Self::new(IdentifyErrorKind::Io, source)
    }
}

impl From<Cancelled> for IdentifyError {
    fn from(source: Cancelled) -> Self {
        Self::new(IdentifyErrorKind::Cancelled, source)
    }
}
