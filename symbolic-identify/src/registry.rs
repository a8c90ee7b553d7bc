use std::fmt;

use symbolic_common::{CancellationToken, Sniff};
use symbolic_msf::{Msf20, Msf70};

use crate::base::{BoxedSource, ReadResult, SymbolMetadataProvider};
use crate::fallback::FallbackProvider;
use crate::mz::MzProvider;
use crate::pdb::PdbProvider;

/// An ordered list of providers that are tried in turn.
///
/// The [`Default`] registry tries PDB 7.00, PDB 2.00, PE images and finally the content
/// hash. Since the last one recognizes everything, it always produces metadata.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn SymbolMetadataProvider>>,
}

impl ProviderRegistry {
    /// Creates a registry without providers.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Appends a provider with the lowest priority so far.
    pub fn with_provider<P>(mut self, provider: P) -> Self
    where
        P: SymbolMetadataProvider + 'static,
    {
        self.push(provider);
        self
    }

    /// Appends a provider with the lowest priority so far.
    pub fn push<P>(&mut self, provider: P)
    where
        P: SymbolMetadataProvider + 'static,
    {
        self.providers.push(Box::new(provider));
    }

    /// Names of the providers in priority order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.iter().map(|provider| provider.name())
    }

    /// Offers the source to each provider until one recognizes it.
    ///
    /// A provider that recognizes the source but fails to load it ends the search with
    /// its error.
    pub fn identify(&self, mut source: BoxedSource, cancel: &CancellationToken) -> ReadResult {
        for provider in &self.providers {
            cancel.check()?;
            match provider.try_read(source, cancel)? {
                Sniff::Recognized(metadata) => {
                    tracing::debug!(
                        provider = provider.name(),
                        identifier = metadata.identifier(),
                        "identified symbol file"
                    );
                    return Ok(Sniff::Recognized(metadata));
                }
                Sniff::NotRecognized(returned) => source = returned,
            }
        }

        Ok(Sniff::NotRecognized(source))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
            .with_provider(PdbProvider::<Msf70>::new())
            .with_provider(PdbProvider::<Msf20>::new())
            .with_provider(MzProvider::new())
            .with_provider(FallbackProvider::new())
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
