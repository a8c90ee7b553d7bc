use std::error::Error;
use std::fmt;
use std::io;

use thiserror::Error;

use symbolic_common::Cancelled;

/// The kind of an [`MsfError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsfErrorKind {
    /// An unexpected failure, usually an I/O error of the backing source.
    Unknown,

    /// The file uses a container feature that cannot be read or written.
    UnsupportedFeature,

    /// The file ends prematurely or contains inconsistent structures.
    AssumedCorrupt,

    /// The operation was aborted through its cancellation token.
    Cancelled,
}

impl fmt::Display for MsfErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown error"),
            Self::UnsupportedFeature => write!(f, "unsupported container feature"),
            Self::AssumedCorrupt => write!(f, "corrupt or truncated container"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

/// An error when reading or writing an MSF container.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct MsfError {
    kind: MsfErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl MsfError {
    /// Creates a new MSF error from a known kind of error as well as an arbitrary error
    /// payload.
    pub(crate) fn new<E>(kind: MsfErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`MsfErrorKind`] for this error.
    pub fn kind(&self) -> MsfErrorKind {
        self.kind
    }

    /// Returns `true` if this error reports a file that could not be loaded.
    ///
    /// Cancellation is not a load failure.
    pub fn is_load_failure(&self) -> bool {
        self.kind != MsfErrorKind::Cancelled
    }

    pub(crate) fn corrupt<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::new(MsfErrorKind::AssumedCorrupt, source)
    }

    pub(crate) fn unsupported<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::new(MsfErrorKind::UnsupportedFeature, source)
    }

    /// Wraps this error so it can travel through the `std::io` traits.
    ///
    /// [`From<io::Error>`] recovers the original error.
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match self.kind {
            MsfErrorKind::AssumedCorrupt => io::ErrorKind::UnexpectedEof,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, self)
    }
}

impl From<MsfErrorKind> for MsfError {
    fn from(kind: MsfErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<Cancelled> for MsfError {
    fn from(source: Cancelled) -> Self {
        Self::new(MsfErrorKind::Cancelled, source)
    }
}

impl From<scroll::Error> for MsfError {
    fn from(source: scroll::Error) -> Self {
        Self::corrupt(source)
    }
}

impl From<io::Error> for MsfError {
    fn from(source: io::Error) -> Self {
        if source.get_ref().is_some_and(|inner| inner.is::<MsfError>()) {
            return match source.into_inner().map(|inner| inner.downcast::<MsfError>()) {
                Some(Ok(error)) => *error,
                _ => MsfErrorKind::Unknown.into(),
            };
        }

        let kind = match source.kind() {
            io::ErrorKind::UnexpectedEof => MsfErrorKind::AssumedCorrupt,
            _ => MsfErrorKind::Unknown,
        };
        Self::new(kind, source)
    }
}
