use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use symbolic_common::{CancellationToken, ContentHasher, Sniff};
use symbolic_identify::{
    BoxedSource, FallbackProvider, IdentifyErrorKind, MzProvider, ProviderRegistry,
    SymbolMetadata, SymbolMetadataProvider,
};
use symbolic_srcsrv::SourceInformation;
use symbolic_testutils::{read_fixture, MsfBuilder};

/// A source whose contents remain accessible after it has been handed to a provider.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedBuffer {
    fn new(data: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(Cursor::new(data))))
    }

    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().get_ref().clone()
    }

    fn truncate(&self, len: usize) {
        self.0.lock().unwrap().get_mut().truncate(len);
    }
}

impl Read for SharedBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().unwrap().read(buf)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().unwrap().seek(pos)
    }
}

fn boxed(data: Vec<u8>) -> BoxedSource {
    Box::new(Cursor::new(data))
}

fn identify(source: BoxedSource) -> Box<dyn SymbolMetadata> {
    match ProviderRegistry::default().identify(source, &CancellationToken::new()) {
        Ok(Sniff::Recognized(metadata)) => metadata,
        Ok(Sniff::NotRecognized(_)) => panic!("not recognized"),
        Err(error) => panic!("failed to identify: {error}"),
    }
}

/// A PE image with only the headers that identify it.
fn pe_image(machine: u16, magic: u16, timestamp: u32, size_of_image: u32) -> Vec<u8> {
    let pe_offset = 0x80;
    let optional_size: usize = if magic == 0x20b { 240 } else { 224 };

    let mut image = vec![0; 1024];
    image[..2].copy_from_slice(b"MZ");
    image[60..64].copy_from_slice(&(pe_offset as u32).to_le_bytes());

    image[pe_offset..pe_offset + 4].copy_from_slice(b"PE\0\0");
    let coff = pe_offset + 4;
    image[coff..coff + 2].copy_from_slice(&machine.to_le_bytes());
    image[coff + 4..coff + 8].copy_from_slice(&timestamp.to_le_bytes());
    image[coff + 16..coff + 18].copy_from_slice(&(optional_size as u16).to_le_bytes());
    image[coff + 18..coff + 20].copy_from_slice(&0x0102u16.to_le_bytes());

    let optional = coff + 20;
    image[optional..optional + 2].copy_from_slice(&magic.to_le_bytes());
    image[optional + 56..optional + 60].copy_from_slice(&size_of_image.to_le_bytes());
    let rva_count = optional + optional_size - 16 * 8 - 4;
    image[rva_count..rva_count + 4].copy_from_slice(&16u32.to_le_bytes());

    image
}

fn hex_hash(data: &[u8]) -> String {
    ContentHasher::hash128(0, data)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[test]
fn test_pdb70_with_srcsrv() {
    let srcsrv = read_fixture("srcsrv/referencesource.txt");
    let image = MsfBuilder::new()
        .named_stream("/names", b"")
        .named_stream("srcsrv", srcsrv.as_bytes())
        .build();

    let metadata = identify(boxed(image));
    assert_eq!(metadata.identifier(), "63ba9bb5992dfc429f6bcc52135dbb091");
    assert!(metadata.supports_source_server_info());
    assert!(metadata.has_source_server_info());

    let files = metadata.source_information().unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(
        files[2].original_file(),
        "f:\\dd\\NDP\\fx\\src\\WinForms\\Managed\\System\\Resources\\ResXFileRef.cs"
    );
    assert!(files[2].target_path().unwrap().ends_with(" - ResXFileRef.cs"));
}

#[test]
fn test_pdb70_without_srcsrv() {
    let image = MsfBuilder::new().named_stream("/names", b"").build();

    let metadata = identify(boxed(image));
    assert!(metadata.supports_source_server_info());
    assert!(!metadata.has_source_server_info());
    assert!(metadata.source_information().unwrap().is_empty());
}

#[test]
fn test_pdb70_malformed_srcsrv() {
    let text = "SRCSRV: ini ---\nSRCSRV: variables ---\nSRCSRV: source files ---\na*b\n";
    let image = MsfBuilder::new()
        .named_stream("srcsrv", text.as_bytes())
        .build();

    let metadata = identify(boxed(image));
    assert!(metadata.has_source_server_info());
    assert!(metadata.source_information().unwrap().is_empty());
}

#[test]
fn test_pdb70_truncated_srcsrv_is_msf_error() {
    let srcsrv = read_fixture("srcsrv/referencesource.txt");
    let buffer = SharedBuffer::new(
        MsfBuilder::new()
            .named_stream("srcsrv", srcsrv.as_bytes())
            .build(),
    );

    let metadata = identify(Box::new(buffer.clone()));
    // the srcsrv stream starts on page 4
    buffer.truncate(4 * 512);

    let error = metadata.source_information().unwrap_err();
    assert_eq!(error.kind(), IdentifyErrorKind::Msf);
}

#[test]
fn test_pdb70_write_srcsrv() {
    let buffer = SharedBuffer::new(MsfBuilder::new().named_stream("/names", b"").build());
    let files = vec![
        SourceInformation::new("c:\\src\\main.cpp", Some("https://x/main.cpp".into())),
        SourceInformation::new("c:\\src\\util.h", None),
    ];

    let mut metadata = identify(Box::new(buffer.clone()));
    metadata.set_source_information(files.clone()).unwrap();
    metadata.save().unwrap();
    drop(metadata);

    let metadata = identify(boxed(buffer.contents()));
    assert_eq!(metadata.identifier(), "63ba9bb5992dfc429f6bcc52135dbb091");
    assert!(metadata.has_source_server_info());
    similar_asserts::assert_eq!(metadata.source_information().unwrap(), files);
}

#[test]
fn test_pdb70_replace_srcsrv() {
    let srcsrv = read_fixture("srcsrv/referencesource.txt");
    let buffer = SharedBuffer::new(
        MsfBuilder::new()
            .named_stream("srcsrv", srcsrv.as_bytes())
            .build(),
    );
    let files = vec![SourceInformation::new("a.cs", Some("b".into()))];

    let mut metadata = identify(Box::new(buffer.clone()));
    metadata.set_source_information(files.clone()).unwrap();
    metadata.save().unwrap();
    drop(metadata);

    let metadata = identify(boxed(buffer.contents()));
    assert_eq!(metadata.source_information().unwrap(), files);
}

#[test]
fn test_pdb20() {
    let image = MsfBuilder::v20().signature(0x3c2d1e0f).age(7).build();

    let metadata = identify(boxed(image));
    assert_eq!(metadata.identifier(), "3c2d1e0f7");
    assert!(metadata.supports_source_server_info());
    assert!(!metadata.has_source_server_info());
}

#[test]
fn test_corrupt_pdb_is_error() {
    let mut image = MsfBuilder::new().stream(b"data").build();
    image.truncate(5 * 512);

    let result = ProviderRegistry::default().identify(boxed(image), &CancellationToken::new());
    let error = result.err().unwrap();
    assert_eq!(error.kind(), IdentifyErrorKind::Msf);
}

#[test]
fn test_pe32() {
    let image = pe_image(0x14c, 0x10b, 0x550953a8, 0xc000);

    let metadata = identify(boxed(image));
    assert_eq!(metadata.identifier(), "550953A8c000");
    assert!(!metadata.supports_source_server_info());
    assert!(!metadata.has_source_server_info());
    assert!(metadata.source_information().unwrap().is_empty());
}

#[test]
fn test_pe64() {
    let image = pe_image(0x8664, 0x20b, 0x0000abcd, 0x12_3000);

    let metadata = identify(boxed(image));
    assert_eq!(metadata.identifier(), "0000ABCD3000");
}

#[test]
fn test_pe_identifier_width() {
    let image = pe_image(0x14c, 0x10b, 0x1234, 0x0001_0000);
    let identifier = identify(boxed(image)).identifier().to_owned();
    assert_eq!(identifier, "000012340000");
    assert_eq!(identifier.len(), 12);
}

#[test]
fn test_pe_does_not_support_srcsrv() {
    let image = pe_image(0x14c, 0x10b, 1, 0x1000);
    let mut metadata = identify(boxed(image));

    let error = metadata.set_source_information(Vec::new()).unwrap_err();
    assert_eq!(error.kind(), IdentifyErrorKind::NotSupported);
    let error = metadata.save().unwrap_err();
    assert_eq!(error.kind(), IdentifyErrorKind::NotSupported);
}

#[test]
fn test_pe_unsupported_machine_falls_back() {
    // ARM
    let image = pe_image(0x1c0, 0x10b, 1, 0x1000);
    let expected = hex_hash(&image);

    let result = MzProvider::new().try_read(boxed(image), &CancellationToken::new());
    assert!(!result.unwrap().is_recognized());

    let image = pe_image(0x1c0, 0x10b, 1, 0x1000);
    assert_eq!(identify(boxed(image)).identifier(), expected);
}

#[test]
fn test_fallback() {
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
    let expected = hex_hash(&data);

    let metadata = identify(boxed(data));
    assert_eq!(metadata.identifier(), expected);
    assert!(!metadata.supports_source_server_info());
    assert_eq!(
        metadata.source_information().unwrap(),
        Vec::<SourceInformation>::new()
    );
}

#[test]
fn test_fallback_empty() {
    let provider = FallbackProvider::new();
    let result = provider.try_read(boxed(Vec::new()), &CancellationToken::new());
    let metadata = result.unwrap().recognized().unwrap();
    assert_eq!(metadata.identifier(), "00000000000000000000000000000000");
}

#[test]
fn test_source_handed_on_unchanged() {
    let data = b"MZ but nothing else".to_vec();
    let expected = hex_hash(&data);
    assert_eq!(identify(boxed(data)).identifier(), expected);
}

#[test]
fn test_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let image = MsfBuilder::new().build();
    let result = ProviderRegistry::default().identify(boxed(image), &cancel);
    assert_eq!(result.err().unwrap().kind(), IdentifyErrorKind::Cancelled);
}

#[test]
fn test_empty_registry() {
    let registry = ProviderRegistry::new();
    let result = registry.identify(boxed(vec![1, 2, 3]), &CancellationToken::new());
    assert!(!result.unwrap().is_recognized());
}

#[cfg(feature = "async")]
mod tasks {
    use super::*;

    use symbolic_identify::tasks;

    #[tokio::test]
    async fn test_identify_matches_blocking() {
        let srcsrv = read_fixture("srcsrv/referencesource.txt");
        let image = MsfBuilder::new()
            .named_stream("srcsrv", srcsrv.as_bytes())
            .build();

        let blocking = identify(boxed(image.clone()));
        let registry = Arc::new(ProviderRegistry::default());
        let result = tasks::identify(registry, boxed(image), CancellationToken::new()).await;
        let metadata = result.unwrap().recognized().unwrap();
        assert_eq!(metadata.identifier(), blocking.identifier());

        let (_, files) = tasks::source_information(metadata).await.unwrap();
        assert_eq!(files, blocking.source_information().unwrap());
    }

    #[tokio::test]
    async fn test_save() {
        let buffer = SharedBuffer::new(MsfBuilder::new().build());
        let files = vec![SourceInformation::new("a.cs", Some("http://x/a.cs".into()))];

        let mut metadata = identify(Box::new(buffer.clone()));
        metadata.set_source_information(files.clone()).unwrap();
        drop(tasks::save(metadata).await.unwrap());

        let metadata = identify(boxed(buffer.contents()));
        assert_eq!(metadata.source_information().unwrap(), files);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let registry = Arc::new(ProviderRegistry::default());
        let result = tasks::identify(registry, boxed(vec![0; 16]), cancel).await;
        assert_eq!(result.err().unwrap().kind(), IdentifyErrorKind::Cancelled);
    }
}
