//! Running the blocking readers from async code.
//!
//! Each function moves its work onto the tokio blocking thread pool and produces the same
//! result as its blocking counterpart.

use std::panic;
use std::sync::Arc;

use symbolic_common::CancellationToken;
use symbolic_srcsrv::SourceInformation;

use crate::base::{BoxedSource, ReadResult, SymbolMetadata};
use crate::error::{IdentifyError, IdentifyErrorKind};
use crate::registry::ProviderRegistry;

async fn run_blocking<T, F>(f: F) -> Result<T, IdentifyError>
where
    F: FnOnce() -> Result<T, IdentifyError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(error) if error.is_cancelled() => {
            Err(IdentifyError::new(IdentifyErrorKind::Cancelled, error))
        }
        Err(error) => panic::resume_unwind(error.into_panic()),
    }
}

/// Async form of [`ProviderRegistry::identify`].
pub async fn identify(
    registry: Arc<ProviderRegistry>,
    source: BoxedSource,
    cancel: CancellationToken,
) -> ReadResult {
    run_blocking(move || registry.identify(source, &cancel)).await
}

/// Async form of [`SymbolMetadata::source_information`].
///
/// Returns the metadata along with the mappings.
pub async fn source_information(
    metadata: Box<dyn SymbolMetadata>,
) -> Result<(Box<dyn SymbolMetadata>, Vec<SourceInformation>), IdentifyError> {
    run_blocking(move || {
        let files = metadata.source_information()?;
        Ok((metadata, files))
    })
    .await
}

/// Async form of [`SymbolMetadata::save`].
///
/// Returns the metadata once it has been written.
pub async fn save(
    mut metadata: Box<dyn SymbolMetadata>,
) -> Result<Box<dyn SymbolMetadata>, IdentifyError> {
    run_blocking(move || {
        metadata.save()?;
        Ok(metadata)
    })
    .await
}
