use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;

use symbolic_common::{CancellationToken, Sniff};
use symbolic_msf::{MsfError, MsfFile, MsfFormat, OpenOptions};
use symbolic_srcsrv::{ParseOptions, SourceInformation, SrcSrvStream, SrcSrvWriter};

use crate::base::{BoxedSource, ReadResult, SymbolMetadata, SymbolMetadataProvider};
use crate::error::IdentifyError;

/// Name of the stream holding source server information.
pub const SRCSRV_STREAM: &str = "srcsrv";

/// Recognizes PDBs in the container format `F`.
pub struct PdbProvider<F> {
    format: PhantomData<fn() -> F>,
}

impl<F> PdbProvider<F> {
    /// Creates the provider.
    pub fn new() -> Self {
        Self {
            format: PhantomData,
        }
    }
}

impl<F> Default for PdbProvider<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: MsfFormat> fmt::Debug for PdbProvider<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PdbProvider").field(&F::NAME).finish()
    }
}

impl<F: MsfFormat> SymbolMetadataProvider for PdbProvider<F> {
    fn name(&self) -> &'static str {
        F::NAME
    }

    fn try_read(&self, source: BoxedSource, cancel: &CancellationToken) -> ReadResult {
        let options = OpenOptions::new().cancel(cancel.clone());
        let file = match MsfFile::<BoxedSource, F>::open_with(source, options)? {
            Sniff::Recognized(file) => file,
            Sniff::NotRecognized(source) => return Ok(Sniff::NotRecognized(source)),
        };

        let metadata = PdbMetadata {
            identifier: file.identifier(),
            file,
            cancel: cancel.clone(),
        };
        Ok(Sniff::Recognized(Box::new(metadata)))
    }
}

/// A PDB recognized by a [`PdbProvider`].
///
/// Source server information lives in the `srcsrv` named stream.
pub struct PdbMetadata<F: MsfFormat> {
    file: MsfFile<BoxedSource, F>,
    identifier: String,
    cancel: CancellationToken,
}

impl<F: MsfFormat> PdbMetadata<F> {
    /// The underlying container.
    pub fn file(&self) -> &MsfFile<BoxedSource, F> {
        &self.file
    }
}

impl<F: MsfFormat> SymbolMetadata for PdbMetadata<F> {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn supports_source_server_info(&self) -> bool {
        true
    }

    fn has_source_server_info(&self) -> bool {
        self.file.named_stream_exists(SRCSRV_STREAM)
    }

    fn source_information(&self) -> Result<Vec<SourceInformation>, IdentifyError> {
        if !self.has_source_server_info() {
            return Ok(Vec::new());
        }

        let options = ParseOptions {
            cancel: self.cancel.clone(),
            ..ParseOptions::default()
        };

        let mut data = Vec::new();
        self.file
            .named_stream(SRCSRV_STREAM)
            .read_to_end(&mut data)
            .map_err(MsfError::from)?;

        match SrcSrvStream::parse_reader(data.as_slice(), &options) {
            Ok(srcsrv) => Ok(srcsrv.into_source_files()),
            Err(error) if error.is_malformed() => {
                tracing::warn!(
                    %error,
                    identifier = %self.identifier,
                    "ignoring malformed srcsrv stream"
                );
                Ok(Vec::new())
            }
            Err(error) => Err(error.into()),
        }
    }

    fn set_source_information(
        &mut self,
        files: Vec<SourceInformation>,
    ) -> Result<(), IdentifyError> {
        let text = SrcSrvWriter::new().render(&files)?;

        let mut stream = self.file.named_stream(SRCSRV_STREAM);
        stream.set_len(0)?;
        stream.write_all(text.as_bytes()).map_err(MsfError::from)?;
        stream.flush().map_err(MsfError::from)?;
        Ok(())
    }

    fn save(&mut self) -> Result<(), IdentifyError> {
        self.file.save()?;
        Ok(())
    }
}

impl<F: MsfFormat> fmt::Debug for PdbMetadata<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdbMetadata")
            .field("identifier", &self.identifier)
            .field("file", &self.file)
            .finish()
    }
}
