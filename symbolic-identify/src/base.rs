use std::fmt;
use std::io::{Read, Seek, Write};

use symbolic_common::{CancellationToken, Sniff};
use symbolic_srcsrv::SourceInformation;

use crate::error::{IdentifyError, IdentifyErrorKind};

/// A seekable byte source that symbol files are read from and saved to.
///
/// Implemented for every `Read + Write + Seek + Send` type, such as a [`std::fs::File`] or
/// a [`std::io::Cursor`] over a vector.
pub trait Source: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> Source for T {}

/// A type-erased [`Source`], handed from provider to provider.
pub type BoxedSource = Box<dyn Source>;

/// The outcome of [`SymbolMetadataProvider::try_read`].
///
/// A source that is not recognized is handed back for the next provider.
pub type ReadResult = Result<Sniff<Box<dyn SymbolMetadata>, BoxedSource>, IdentifyError>;

/// Information about a recognized symbol file.
pub trait SymbolMetadata: fmt::Debug + Send {
    /// The identifier under which a symbol server stores this file.
    fn identifier(&self) -> &str;

    /// Returns `true` if this kind of file can carry source server information.
    fn supports_source_server_info(&self) -> bool;

    /// Returns `true` if this file currently carries source server information.
    fn has_source_server_info(&self) -> bool;

    /// Reads the source server mappings of this file.
    ///
    /// Files without source server information return an empty list.
    fn source_information(&self) -> Result<Vec<SourceInformation>, IdentifyError>;

    /// Replaces the source server mappings of this file.
    ///
    /// The change is written to the source on [`save`](Self::save). Fails with
    /// [`IdentifyErrorKind::NotSupported`] unless
    /// [`supports_source_server_info`](Self::supports_source_server_info) is `true`.
    fn set_source_information(
        &mut self,
        files: Vec<SourceInformation>,
    ) -> Result<(), IdentifyError>;

    /// Writes pending changes back to the source.
    fn save(&mut self) -> Result<(), IdentifyError>;
}

/// Recognizes one kind of symbol file.
pub trait SymbolMetadataProvider: Send + Sync {
    /// A human readable name of the recognized file type.
    fn name(&self) -> &'static str;

    /// Reads symbol metadata from the start of `source`.
    ///
    /// Returns [`Sniff::NotRecognized`] with the source if the data is not of this
    /// provider's format. Errors are reserved for recognized files that fail to load.
    fn try_read(&self, source: BoxedSource, cancel: &CancellationToken) -> ReadResult;
}

/// Metadata of files that do not carry source server information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PlainMetadata {
    identifier: String,
}

impl PlainMetadata {
    pub fn new(identifier: String) -> Self {
        Self { identifier }
    }
}

impl SymbolMetadata for PlainMetadata {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn supports_source_server_info(&self) -> bool {
        false
    }

    fn has_source_server_info(&self) -> bool {
        false
    }

    fn source_information(&self) -> Result<Vec<SourceInformation>, IdentifyError> {
        Ok(Vec::new())
    }

    fn set_source_information(
        &mut self,
        _files: Vec<SourceInformation>,
    ) -> Result<(), IdentifyError> {
        Err(IdentifyErrorKind::NotSupported.into())
    }

    fn save(&mut self) -> Result<(), IdentifyError> {
        Err(IdentifyErrorKind::NotSupported.into())
    }
}
