use std::io::{self, Read, Seek, SeekFrom};

use goblin::pe::header::{Header, COFF_MACHINE_IA64, COFF_MACHINE_X86, COFF_MACHINE_X86_64};
use goblin::pe::optional_header::{MAGIC_32, MAGIC_64};

use symbolic_common::{CancellationToken, Sniff};

use crate::base::{BoxedSource, PlainMetadata, ReadResult, SymbolMetadataProvider};

const DOS_MAGIC: &[u8] = b"MZ";
const DOS_HEADER_SIZE: usize = 64;
const PE_POINTER_OFFSET: usize = 60;

/// Signature, file header and the largest optional header including data directories.
const PE_HEADERS_SIZE: u64 = 4 + 20 + 240;

/// Recognizes PE images (`.exe`, `.dll`) for x86, x86_64 and Itanium.
#[derive(Clone, Copy, Debug, Default)]
pub struct MzProvider;

impl MzProvider {
    /// Creates the provider.
    pub fn new() -> Self {
        Self
    }
}

impl SymbolMetadataProvider for MzProvider {
    fn name(&self) -> &'static str {
        "PE"
    }

    #[tracing::instrument(level = "trace", name = "MzProvider::try_read", skip_all)]
    fn try_read(&self, mut source: BoxedSource, cancel: &CancellationToken) -> ReadResult {
        cancel.check()?;

        match read_identifier(&mut source)? {
            Some(identifier) => Ok(Sniff::Recognized(Box::new(PlainMetadata::new(identifier)))),
            None => Ok(Sniff::NotRecognized(source)),
        }
    }
}

/// Computes `{TimeDateStamp:08X}{SizeOfImage:04x}`, the symbol server key of an image.
///
/// Only the low 16 bits of `SizeOfImage` are part of the key.
///
/// Returns `None` for anything that is not a supported PE image. Truncated headers are not
/// an error.
fn read_identifier<R: Read + Seek>(source: &mut R) -> Result<Option<String>, io::Error> {
    source.seek(SeekFrom::Start(0))?;

    let mut data = Vec::with_capacity(DOS_HEADER_SIZE);
    source.by_ref().take(DOS_HEADER_SIZE as u64).read_to_end(&mut data)?;
    if !data.starts_with(DOS_MAGIC) || data.len() < DOS_HEADER_SIZE {
        return Ok(None);
    }

    let mut pointer = [0; 4];
    pointer.copy_from_slice(&data[PE_POINTER_OFFSET..PE_POINTER_OFFSET + 4]);
    let pe_pointer = u64::from(u32::from_le_bytes(pointer));

    let remaining = (pe_pointer + PE_HEADERS_SIZE).saturating_sub(data.len() as u64);
    source.by_ref().take(remaining).read_to_end(&mut data)?;

    let header = match Header::parse(&data) {
        Ok(header) => header,
        Err(error) => {
            tracing::trace!(%error, "not a PE image");
            return Ok(None);
        }
    };

    let machine = header.coff_header.machine;
    if ![COFF_MACHINE_X86, COFF_MACHINE_IA64, COFF_MACHINE_X86_64].contains(&machine) {
        return Ok(None);
    }

    let Some(optional_header) = header.optional_header else {
        return Ok(None);
    };
    let magic = optional_header.standard_fields.magic;
    if magic != MAGIC_32 && magic != MAGIC_64 {
        return Ok(None);
    }

    // Symbol servers key images by the low 16 bits of the image size.
    let size_of_image = optional_header.windows_fields.size_of_image as u16;
    let time_date_stamp = header.coff_header.time_date_stamp;
    Ok(Some(format!("{time_date_stamp:08X}{size_of_image:04x}")))
}
