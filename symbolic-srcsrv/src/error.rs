use std::error::Error;
use std::fmt;
use std::io;

use thiserror::Error;

use symbolic_common::Cancelled;

/// The kind of a [`SrcSrvError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SrcSrvErrorKind {
    /// The variables section does not define `SRCSRVTRG`.
    MissingTarget,

    /// A variable value is not a well-formed expression.
    InvalidExpression,

    /// Variables reference each other too deeply, usually because of a cycle.
    RecursionLimit,

    /// A source file record cannot be rendered into a SRCSRV line.
    InvalidRecord,

    /// Reading or writing the stream failed.
    Io,

    /// The operation was aborted through its cancellation token.
    Cancelled,
}

impl fmt::Display for SrcSrvErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget => write!(f, "missing SRCSRVTRG variable"),
            Self::InvalidExpression => write!(f, "invalid variable expression"),
            Self::RecursionLimit => write!(f, "variable recursion limit exceeded"),
            Self::InvalidRecord => write!(f, "invalid source file record"),
            Self::Io => write!(f, "failed to read or write the stream"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

/// An error when interpreting or rendering a SRCSRV stream.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct SrcSrvError {
    kind: SrcSrvErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl SrcSrvError {
    /// Creates a new SRCSRV error from a known kind of error as well as an arbitrary error
    /// payload.
    pub(crate) fn new<E>(kind: SrcSrvErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`SrcSrvErrorKind`] for this error.
    pub fn kind(&self) -> SrcSrvErrorKind {
        self.kind
    }

    /// Returns `true` if the stream contents are at fault, rather than the environment.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self.kind,
            SrcSrvErrorKind::MissingTarget
                | SrcSrvErrorKind::InvalidExpression
                | SrcSrvErrorKind::RecursionLimit
        )
    }
}

impl From<SrcSrvErrorKind> for SrcSrvError {
    fn from(kind: SrcSrvErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<Cancelled> for SrcSrvError {
    fn from(source: Cancelled) -> Self {
        Self::new(SrcSrvErrorKind::Cancelled, source)
    }
}

impl From<io::Error> for SrcSrvError {
    fn from(source: io::Error) -> Self {
        Self::new(SrcSrvErrorKind::Io, source)
    }
}
