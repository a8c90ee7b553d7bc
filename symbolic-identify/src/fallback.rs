use std::io::{self, Read, Seek, SeekFrom};

use symbolic_common::{CancellationToken, ContentHasher, Sniff};

use crate::base::{BoxedSource, PlainMetadata, ReadResult, SymbolMetadataProvider};
use crate::error::IdentifyError;

const CHUNK_SIZE: usize = 4096;

/// Identifies any file by the hash of its contents.
///
/// This provider recognizes every source and therefore goes last.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackProvider;

impl FallbackProvider {
    /// Creates the provider.
    pub fn new() -> Self {
        Self
    }
}

impl SymbolMetadataProvider for FallbackProvider {
    fn name(&self) -> &'static str {
        "content hash"
    }

    #[tracing::instrument(level = "trace", name = "FallbackProvider::try_read", skip_all)]
    fn try_read(&self, mut source: BoxedSource, cancel: &CancellationToken) -> ReadResult {
        let identifier = hash_contents(&mut source, cancel)?;
        Ok(Sniff::Recognized(Box::new(PlainMetadata::new(identifier))))
    }
}

/// Hashes the full contents of `source` into 32 lowercase hex digits.
pub(crate) fn hash_contents<R: Read + Seek>(
    source: &mut R,
    cancel: &CancellationToken,
) -> Result<String, IdentifyError> {
    source.seek(SeekFrom::Start(0))?;

    let mut hasher = ContentHasher::new();
    let mut chunk = vec![0; CHUNK_SIZE];
    loop {
        cancel.check()?;
        let read = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&chunk[..read]);
    }

    Ok(hasher.finalize_hex())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_matches_one_shot_hash() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let identifier = hash_contents(&mut Cursor::new(&data), &CancellationToken::new()).unwrap();

        let mut expected = String::new();
        for byte in ContentHasher::hash128(0, &data) {
            expected.push_str(&format!("{byte:02x}"));
        }
        assert_eq!(identifier, expected);
    }

    #[test]
    fn test_rewinds() {
        let mut source = Cursor::new(b"some contents".to_vec());
        source.set_position(5);
        let first = hash_contents(&mut source, &CancellationToken::new()).unwrap();
        let second = hash_contents(&mut source, &CancellationToken::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = hash_contents(&mut Cursor::new(vec![0; 16]), &cancel).unwrap_err();
        assert_eq!(error.kind(), crate::IdentifyErrorKind::Cancelled);
    }
}
