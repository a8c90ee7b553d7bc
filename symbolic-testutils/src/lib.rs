//! Test helpers for `symbolic`.
//!
//! There are no binary PDB fixtures in this repository. Instead, [`MsfBuilder`] lays out
//! byte-exact MSF images in memory, independently of the reader under test. Text fixtures
//! live in the `fixtures` directory.
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

/// Returns the full path to the specified fixture.
///
/// Fixtures are stored in the `symbolic-testutils/fixtures` directory and paths should be
/// given relative to that location.
///
/// # Example
///
/// ```
/// use symbolic_testutils::fixture;
///
/// let path = fixture("srcsrv/referencesource.txt");
/// assert!(path.ends_with("srcsrv/referencesource.txt"));
/// ```
pub fn fixture<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut full_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    full_path.push("fixtures");
    full_path.push(path.as_ref());

    assert!(
        full_path.exists(),
        "Fixture does not exist: {}",
        full_path.display()
    );

    full_path
}

/// Reads the specified fixture into a string.
pub fn read_fixture<P: AsRef<Path>>(path: P) -> String {
    let path = fixture(path);
    match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) => panic!("Cannot read fixture {}: {error}", path.display()),
    }
}

/// Magic of the 7.00 container.
pub const MSF70_MAGIC: &[u8] = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0";

/// Magic of the 2.00 container.
pub const MSF20_MAGIC: &[u8] = b"Microsoft C/C++ program database 2.00\r\n\x1aJG\0\0";

/// GUID used by default, `{b59bba63-2d99-42fc-9f6b-cc52135dbb09}` in on-disk byte order.
pub const DEFAULT_GUID: [u8; 16] = [
    0x63, 0xba, 0x9b, 0xb5, 0x99, 0x2d, 0xfc, 0x42, 0x9f, 0x6b, 0xcc, 0x52, 0x13, 0x5d, 0xbb, 0x09,
];

/// Container version produced by an [`MsfBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsfVersion {
    /// `Microsoft C/C++ MSF 7.00`
    V70,
    /// `Microsoft C/C++ program database 2.00`
    V20,
}

#[derive(Clone, Debug)]
enum Entry {
    Data(Vec<u8>),
    Nil,
}

/// Lays out an MSF image.
///
/// Pages are assigned front to back: the header page, the free page map, for 7.00 the
/// directory page list, then every stream in index order and finally the directory.
/// The page count is rounded up to a multiple of 32 so that the free page map covers
/// every page.
///
/// # Example
///
/// ```
/// use symbolic_testutils::MsfBuilder;
///
/// let image = MsfBuilder::new().stream(b"hello").build();
/// assert!(image.starts_with(symbolic_testutils::MSF70_MAGIC));
/// assert_eq!(image.len(), 32 * 512);
/// ```
#[derive(Clone, Debug)]
pub struct MsfBuilder {
    version: MsfVersion,
    page_size: u32,
    info_version: u32,
    signature: u32,
    age: u32,
    guid: [u8; 16],
    entries: Vec<Entry>,
    names: Vec<(String, u32)>,
    name_table: bool,
    deleted: Vec<u32>,
    footer: Vec<u8>,
}

impl MsfBuilder {
    /// A 7.00 image with 512 byte pages.
    pub fn new() -> Self {
        Self {
            version: MsfVersion::V70,
            page_size: 512,
            info_version: 20000404,
            signature: 0x555c_e245,
            age: 1,
            guid: DEFAULT_GUID,
            entries: Vec::new(),
            names: Vec::new(),
            name_table: true,
            deleted: Vec::new(),
            footer: [0u32.to_le_bytes(), 20091201u32.to_le_bytes()].concat(),
        }
    }

    /// A 2.00 image with 1024 byte pages.
    pub fn v20() -> Self {
        Self {
            version: MsfVersion::V20,
            page_size: 1024,
            info_version: 19941610,
            ..Self::new()
        }
    }

    /// Sets the page size.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the signature of the PDB info header.
    pub fn signature(mut self, signature: u32) -> Self {
        self.signature = signature;
        self
    }

    /// Sets the age of the PDB info header.
    pub fn age(mut self, age: u32) -> Self {
        self.age = age;
        self
    }

    /// Sets the GUID of the PDB info header, in on-disk byte order.
    pub fn guid(mut self, guid: [u8; 16]) -> Self {
        self.guid = guid;
        self
    }

    /// Appends an unnamed stream. The first one gets index 2.
    pub fn stream(mut self, data: &[u8]) -> Self {
        self.entries.push(Entry::Data(data.to_vec()));
        self
    }

    /// Appends a nil stream, whose size is recorded as `0xFFFFFFFF`.
    pub fn nil_stream(mut self) -> Self {
        self.entries.push(Entry::Nil);
        self
    }

    /// Appends a stream and registers it under `name`.
    pub fn named_stream(mut self, name: &str, data: &[u8]) -> Self {
        let index = self.entries.len() as u32 + 2;
        self.entries.push(Entry::Data(data.to_vec()));
        self.names.push((name.to_owned(), index));
        self
    }

    /// Omits the named stream table, so that stream 1 only holds the info header.
    pub fn without_name_table(mut self) -> Self {
        self.name_table = false;
        self
    }

    /// Sets the words of the deleted-entries bit set of the name table.
    pub fn deleted(mut self, words: &[u32]) -> Self {
        self.deleted = words.to_vec();
        self
    }

    /// Sets the bytes trailing the name table.
    pub fn footer(mut self, footer: &[u8]) -> Self {
        self.footer = footer.to_vec();
        self
    }

    /// Returns the contents of stream 1.
    pub fn info_stream(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, self.info_version);
        push_u32(&mut out, self.signature);
        push_u32(&mut out, self.age);
        if self.version == MsfVersion::V70 {
            out.extend_from_slice(&self.guid);
        }

        if !self.name_table {
            return out;
        }

        let mut buffer = Vec::new();
        let mut offsets = Vec::new();
        for (name, _) in &self.names {
            offsets.push(buffer.len() as u32);
            buffer.extend_from_slice(name.as_bytes());
            buffer.push(0);
        }

        push_u32(&mut out, buffer.len() as u32);
        out.extend_from_slice(&buffer);

        let count = self.names.len() as u32;
        push_u32(&mut out, count);
        push_u32(&mut out, count);

        let words = count.div_ceil(32);
        push_u32(&mut out, words);
        for word in 0..words {
            let bits = (count - word * 32).min(32);
            push_u32(&mut out, if bits == 32 { u32::MAX } else { (1 << bits) - 1 });
        }

        push_u32(&mut out, self.deleted.len() as u32);
        for &word in &self.deleted {
            push_u32(&mut out, word);
        }

        for (offset, (_, index)) in offsets.iter().zip(&self.names) {
            push_u32(&mut out, *offset);
            push_u32(&mut out, *index);
        }

        out.extend_from_slice(&self.footer);
        out
    }

    /// Lays out the image.
    pub fn build(&self) -> Vec<u8> {
        let page_size = self.page_size as usize;
        let v70 = self.version == MsfVersion::V70;

        let mut streams = vec![Entry::Data(Vec::new()), Entry::Data(self.info_stream())];
        streams.extend(self.entries.iter().cloned());

        let mut next_page = if v70 { 3 } else { 2 };
        let mut placed = Vec::new();
        for entry in &streams {
            let (size, data) = match entry {
                Entry::Data(data) => (data.len() as u32, data.as_slice()),
                Entry::Nil => (u32::MAX, &[][..]),
            };
            let pages: Vec<u32> = (0..data.len().div_ceil(page_size))
                .map(|i| (next_page + i) as u32)
                .collect();
            next_page += pages.len();
            placed.push((size, data, pages));
        }

        let mut directory = Vec::new();
        if v70 {
            push_u32(&mut directory, placed.len() as u32);
        } else {
            push_u16(&mut directory, placed.len() as u16);
            push_u16(&mut directory, 0);
        }
        for (size, _, _) in &placed {
            push_u32(&mut directory, *size);
            if !v70 {
                push_u32(&mut directory, 0);
            }
        }
        for (_, _, pages) in &placed {
            for &page in pages {
                self.push_page_number(&mut directory, page);
            }
        }

        let directory_pages: Vec<u32> = (0..directory.len().div_ceil(page_size))
            .map(|i| (next_page + i) as u32)
            .collect();
        next_page += directory_pages.len();

        let page_count = next_page.div_ceil(32).max(1) * 32;
        let mut image = vec![0; page_count * page_size];

        let magic = if v70 { MSF70_MAGIC } else { MSF20_MAGIC };
        let mut header = magic.to_vec();
        push_u32(&mut header, self.page_size);
        if v70 {
            push_u32(&mut header, 1);
            push_u32(&mut header, page_count as u32);
            push_u32(&mut header, directory.len() as u32);
            push_u32(&mut header, 0);
            push_u32(&mut header, 2);
        } else {
            push_u16(&mut header, 1);
            push_u16(&mut header, page_count as u16);
            push_u32(&mut header, directory.len() as u32);
            push_u32(&mut header, 0);
        }

        let mut index_list = Vec::new();
        for &page in &directory_pages {
            self.push_page_number(&mut index_list, page);
        }
        if !v70 {
            header.extend_from_slice(&index_list);
        }
        image[..header.len()].copy_from_slice(&header);
        if v70 {
            let offset = 2 * page_size;
            image[offset..offset + index_list.len()].copy_from_slice(&index_list);
        }

        let mut bitmap = Vec::new();
        for word in 0..page_count / 32 {
            let mut bits = 0u32;
            for bit in 0..32 {
                if word * 32 + bit >= next_page {
                    bits |= 1 << bit;
                }
            }
            push_u32(&mut bitmap, bits);
        }
        image[page_size..page_size + bitmap.len()].copy_from_slice(&bitmap);

        for (_, data, pages) in &placed {
            write_pages(&mut image, page_size, pages, data);
        }
        write_pages(&mut image, page_size, &directory_pages, &directory);

        image
    }

    fn push_page_number(&self, out: &mut Vec<u8>, page: u32) {
        match self.version {
            MsfVersion::V70 => push_u32(out, page),
            MsfVersion::V20 => push_u16(out, page as u16),
        }
    }
}

impl Default for MsfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_pages(image: &mut [u8], page_size: usize, pages: &[u32], data: &[u8]) {
    for (&page, chunk) in pages.iter().zip(data.chunks(page_size)) {
        let offset = page as usize * page_size;
        image[offset..offset + chunk.len()].copy_from_slice(chunk);
    }
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_70() {
        let image = MsfBuilder::new().stream(&[0xaa; 600]).build();

        // stream 0 is empty, stream 1 takes page 3, stream 2 pages 4 and 5
        assert_eq!(&image[4 * 512..4 * 512 + 4], &[0xaa; 4]);
        assert_eq!(&image[5 * 512 + 87..5 * 512 + 89], &[0xaa, 0]);

        // directory on page 6, listed on page 2
        assert_eq!(&image[2 * 512..2 * 512 + 4], &[6, 0, 0, 0]);
        assert_eq!(&image[6 * 512..6 * 512 + 4], &[3, 0, 0, 0]);

        // pages 0..7 are used
        assert_eq!(&image[512..516], &[0x80, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_layout_20() {
        let image = MsfBuilder::v20().build();
        assert!(image.starts_with(MSF20_MAGIC));
        assert_eq!(&image[44..48], &1024u32.to_le_bytes());
        // stream 1 on page 2, directory on page 3
        assert_eq!(&image[60..62], &[3, 0]);
        assert_eq!(&image[3 * 1024..3 * 1024 + 4], &[2, 0, 0, 0]);
    }
}
