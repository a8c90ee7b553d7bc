use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;

use indexmap::IndexMap;
use parking_lot::Mutex;
use scroll::{Pread, LE};

use symbolic_common::{CancellationToken, DebugId, Sniff, Uuid};

use crate::bitset::BitSet;
use crate::error::{MsfError, MsfErrorKind};
use crate::format::{Msf20, Msf70, MsfFormat, MsfHeader, PdbInfo, NIL_STREAM_SIZE};
use crate::stream::{StreamRef, VirtualStream};

/// Index of the stream holding the [`PdbInfo`] header and the named stream table.
pub const INFO_STREAM: u32 = 1;

const MIN_PAGE_SIZE: u32 = 256;
const MAX_PAGE_SIZE: u32 = 65536;

/// Size and page list of one stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct StreamInfo {
    pub size: u32,
    pub pages: Vec<u32>,
}

impl StreamInfo {
    /// The logical length. Nil streams are empty.
    pub fn byte_len(&self) -> u64 {
        if self.size == NIL_STREAM_SIZE {
            0
        } else {
            self.size.into()
        }
    }
}

/// Mutable container state shared by all streams of a file.
#[derive(Debug)]
pub(crate) struct Directory {
    pub header: MsfHeader,
    pub bitmap: BitSet,
    pub index: StreamInfo,
    pub streams: Vec<StreamInfo>,
    pub names: IndexMap<String, u32>,
}

impl Directory {
    pub fn stream(&self, stream: StreamRef) -> Option<&StreamInfo> {
        match stream {
            StreamRef::Index => Some(&self.index),
            StreamRef::Stream(index) => self.streams.get(index as usize),
        }
    }

    /// Resizes a stream to `size` bytes, releasing or claiming pages at its end.
    pub fn resize(&mut self, stream: StreamRef, size: u32) -> Result<(), MsfError> {
        let page_size = self.header.page_size as usize;
        let info = match stream {
            StreamRef::Index => &mut self.index,
            StreamRef::Stream(index) => self
                .streams
                .get_mut(index as usize)
                .ok_or_else(|| MsfError::new(MsfErrorKind::Unknown, "stream does not exist"))?,
        };

        if info.size == NIL_STREAM_SIZE {
            tracing::warn!(?stream, "resizing a nil stream");
        }

        let page_count = (size as usize).div_ceil(page_size);
        if info.pages.len() > page_count {
            for page in info.pages.drain(page_count..) {
                self.bitmap.deallocate(page);
            }
        }
        while info.pages.len() < page_count {
            info.pages.push(self.bitmap.allocate());
        }

        info.size = size;
        if stream == StreamRef::Index {
            self.header.index_bytes = size;
        }

        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        if let Some(&index) = self.names.get(name) {
            return Some(index);
        }

        self.names
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, &index)| index)
    }

    fn ensure_stream(&mut self, index: u32) {
        let count = index as usize + 1;
        if self.streams.len() < count {
            self.streams.resize_with(count, StreamInfo::default);
        }
    }
}

/// Options for [`MsfFile::open_with`].
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
    cancel: CancellationToken,
}

impl OpenOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the token observed by every page read and write of the opened file.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// A multi-stream file, the container format of Microsoft PDBs.
///
/// The file is a sequence of fixed-size pages. A directory assigns pages to numbered
/// streams, and stream 1 additionally maps names to stream numbers. The container is
/// opened from any seekable source and can be written back with [`save`](Self::save)
/// after its streams have been modified through [`VirtualStream`]s.
///
/// The format type parameter selects the on-disk layout, see [`Msf70`] and [`Msf20`].
pub struct MsfFile<S, F = Msf70> {
    source: Mutex<S>,
    directory: Mutex<Directory>,
    page_size: u32,
    info: PdbInfo,
    name_table: bool,
    footer: Vec<u8>,
    cancel: CancellationToken,
    format: PhantomData<F>,
}

/// A PDB in the 7.00 container.
pub type Pdb70File<S> = MsfFile<S, Msf70>;

/// A PDB in the legacy 2.00 container.
pub type Pdb20File<S> = MsfFile<S, Msf20>;

impl<S, F> MsfFile<S, F>
where
    S: Read + Write + Seek,
    F: MsfFormat,
{
    /// Tests whether the buffer could contain a container of this format.
    pub fn test(data: &[u8]) -> bool {
        data.starts_with(F::MAGIC)
    }

    /// Opens a container from the given source.
    ///
    /// Returns [`Sniff::NotRecognized`] with the untouched source if it does not start
    /// with the magic of this format. Once the magic matched, any failure to load the file
    /// is an error.
    pub fn open(source: S) -> Result<Sniff<Self, S>, MsfError> {
        Self::open_with(source, OpenOptions::default())
    }

    /// Opens a container with custom options.
    #[tracing::instrument(level = "trace", name = "MsfFile::open", skip_all, fields(format = F::NAME))]
    pub fn open_with(mut source: S, options: OpenOptions) -> Result<Sniff<Self, S>, MsfError> {
        options.cancel.check()?;

        if !has_magic::<F, S>(&mut source)? {
            return Ok(Sniff::NotRecognized(source));
        }

        Self::load(source, options.cancel).map(Sniff::Recognized)
    }

    fn load(mut source: S, cancel: CancellationToken) -> Result<Self, MsfError> {
        let header = read_header::<F, S>(&mut source)?;
        let page_size = header.page_size;
        let mut bitmap = read_bitmap(&mut source, &header)?;

        // the header, the bitmap and the index page list are never free
        for page in 0..=header.bitmap_page {
            bitmap.set(page as usize, false);
        }
        let index_list_page = F::index_list_offset(&header) / u64::from(page_size);
        bitmap.set(index_list_page as usize, false);

        let index_pages = read_index_pages::<F, S>(&mut source, &header)?;
        for &page in &index_pages {
            bitmap.set(page as usize, false);
        }

        let directory = Directory {
            header,
            bitmap,
            index: StreamInfo {
                size: header.index_bytes,
                pages: index_pages,
            },
            streams: Vec::new(),
            names: IndexMap::new(),
        };

        let mut file = Self {
            source: Mutex::new(source),
            directory: Mutex::new(directory),
            page_size,
            info: PdbInfo::default(),
            name_table: false,
            footer: Vec::new(),
            cancel,
            format: PhantomData,
        };

        file.load_directory()?;
        file.load_info()?;

        let directory = file.directory.get_mut();
        tracing::debug!(
            page_size,
            page_count = directory.header.page_count,
            streams = directory.streams.len(),
            named_streams = directory.names.len(),
            "loaded {}",
            F::NAME
        );

        Ok(file)
    }

    fn load_directory(&mut self) -> Result<(), MsfError> {
        let data = self.read_ref(StreamRef::Index)?;

        let directory = self.directory.get_mut();
        let streams = parse_directory::<F>(&data, &directory.header)?;
        for stream in &streams {
            for &page in &stream.pages {
                directory.bitmap.set(page as usize, false);
            }
        }
        directory.streams = streams;

        if directory.streams.len() <= INFO_STREAM as usize {
            return Err(MsfError::corrupt("missing PDB info stream"));
        }

        Ok(())
    }

    fn load_info(&mut self) -> Result<(), MsfError> {
        let data = self.read_ref(StreamRef::Stream(INFO_STREAM))?;
        if data.len() < F::INFO_SIZE {
            return Err(MsfError::corrupt("truncated PDB info header"));
        }

        let offset = &mut 0;
        self.info = F::read_info(&data, offset)?;

        if *offset >= data.len() {
            return Ok(());
        }

        let names_len: u32 = data.gread_with(offset, LE)?;
        let names: &[u8] = data.gread_with(offset, names_len as usize)?;
        let _count: u32 = data.gread_with(offset, LE)?;
        let max: u32 = data.gread_with(offset, LE)?;

        let mut cursor = &data[*offset..];
        let present = BitSet::read_from(&mut cursor)?;
        let deleted = BitSet::read_from(&mut cursor)?;
        if !deleted.is_empty() {
            return Err(MsfError::unsupported("deleted named stream entries"));
        }

        let directory = self.directory.get_mut();
        for slot in 0..(max as usize).min(present.bit_len()) {
            if !present.get(slot) {
                continue;
            }

            let mut entry = [0; 8];
            cursor.read_exact(&mut entry)?;
            let name_offset = entry.pread_with::<u32>(0, LE)? as usize;
            let stream = entry.pread_with::<u32>(4, LE)?;

            let Some(bytes) = names.get(name_offset..) else {
                tracing::warn!(name_offset, "named stream entry points outside the name buffer");
                continue;
            };
            let Some(end) = bytes.iter().position(|&b| b == 0) else {
                tracing::warn!(name_offset, "unterminated stream name");
                continue;
            };
            let name = std::str::from_utf8(&bytes[..end])
                .map_err(|e| MsfError::new(MsfErrorKind::Unknown, e))?;

            directory.names.insert(name.to_owned(), stream);
        }

        self.name_table = true;
        self.footer = cursor.to_vec();
        Ok(())
    }

    /// Writes all changes back to the source.
    ///
    /// This rewrites the PDB info stream with the current named stream table, then the
    /// directory and the index page list, the free page map and finally the header.
    #[tracing::instrument(level = "trace", name = "MsfFile::save", skip_all, fields(format = F::NAME))]
    pub fn save(&mut self) -> Result<(), MsfError> {
        self.cancel.check()?;

        let info = self.encode_info()?;
        self.write_ref(StreamRef::Stream(INFO_STREAM), &info)?;

        let directory = self.encode_directory()?;
        self.write_ref(StreamRef::Index, &directory)?;

        self.write_index_pages()?;
        self.write_bitmap()?;
        self.write_header()?;

        self.source.get_mut().flush()?;
        Ok(())
    }

    fn encode_info(&mut self) -> Result<Vec<u8>, MsfError> {
        let names = &self.directory.get_mut().names;
        let mut out = Vec::with_capacity(F::INFO_SIZE);
        F::write_info(&self.info, &mut out);

        if !self.name_table && names.is_empty() {
            return Ok(out);
        }

        let mut buffer = Vec::new();
        let mut entries = Vec::with_capacity(names.len());
        for (name, &stream) in names {
            entries.push((buffer.len() as u32, stream));
            buffer.extend_from_slice(name.as_bytes());
            buffer.push(0);
        }

        let count = u32::try_from(names.len())
            .map_err(|_| MsfError::unsupported("too many named streams"))?;
        let name_bytes = u32::try_from(buffer.len())
            .map_err(|_| MsfError::unsupported("stream names too long"))?;

        out.extend_from_slice(&name_bytes.to_le_bytes());
        out.extend_from_slice(&buffer);
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());

        let mut present = BitSet::new();
        for slot in 0..names.len() {
            present.set(slot, true);
        }
        let deleted = BitSet::new();
        out.reserve(
            present.encoded_len() + deleted.encoded_len() + entries.len() * 8 + self.footer.len(),
        );
        present.write_to(&mut out)?;
        deleted.write_to(&mut out)?;

        for (name_offset, stream) in entries {
            out.extend_from_slice(&name_offset.to_le_bytes());
            out.extend_from_slice(&stream.to_le_bytes());
        }

        out.extend_from_slice(&self.footer);
        Ok(out)
    }

    fn encode_directory(&mut self) -> Result<Vec<u8>, MsfError> {
        let directory = self.directory.get_mut();
        let count = u32::try_from(directory.streams.len())
            .map_err(|_| MsfError::unsupported("too many streams"))?;

        let mut out = Vec::new();
        F::write_stream_count(count, &mut out)?;
        for stream in &directory.streams {
            F::write_stream_size(stream.size, &mut out);
        }
        for stream in &directory.streams {
            for &page in &stream.pages {
                F::write_page_number(page, &mut out)?;
            }
        }

        Ok(out)
    }

    fn write_index_pages(&mut self) -> Result<(), MsfError> {
        let directory = self.directory.get_mut();
        let mut out = Vec::new();
        for &page in &directory.index.pages {
            F::write_page_number(page, &mut out)?;
        }

        if out.len() > F::index_list_capacity(&directory.header) {
            return Err(MsfError::unsupported("directory page list exceeds one page"));
        }

        let source = self.source.get_mut();
        source.seek(SeekFrom::Start(F::index_list_offset(&directory.header)))?;
        source.write_all(&out)?;
        Ok(())
    }

    fn write_bitmap(&mut self) -> Result<(), MsfError> {
        let directory = self.directory.get_mut();
        if directory.bitmap.words().len() * 4 > self.page_size as usize {
            return Err(MsfError::unsupported("free page map exceeds one page"));
        }

        let mut out = Vec::with_capacity(directory.bitmap.words().len() * 4);
        for word in directory.bitmap.words() {
            out.extend_from_slice(&word.to_le_bytes());
        }

        let offset = u64::from(directory.header.bitmap_page) * u64::from(self.page_size);
        let source = self.source.get_mut();
        source.seek(SeekFrom::Start(offset))?;
        source.write_all(&out)?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), MsfError> {
        let page_size = u64::from(self.page_size);
        let directory = self.directory.get_mut();
        let index_list_page = (F::index_list_offset(&directory.header) / page_size) as u32;

        let last_page = directory
            .streams
            .iter()
            .chain(Some(&directory.index))
            .flat_map(|stream| stream.pages.iter().copied())
            .chain([directory.header.bitmap_page, index_list_page])
            .max()
            .unwrap_or_default();
        let required = (u64::from(last_page) + 1) * page_size;

        let source = self.source.get_mut();
        let mut len = source.seek(SeekFrom::End(0))?;
        if len < required {
            io::copy(&mut io::repeat(0).take(required - len), source)?;
            len = required;
        }

        directory.header.page_count = u32::try_from(len.div_ceil(page_size))
            .map_err(|_| MsfError::unsupported("file too large"))?;

        let mut out = Vec::with_capacity(F::HEADER_SIZE);
        F::write_header(&directory.header, &mut out)?;
        source.seek(SeekFrom::Start(F::MAGIC.len() as u64))?;
        source.write_all(&out)?;
        Ok(())
    }

    fn read_ref(&self, stream: StreamRef) -> Result<Vec<u8>, MsfError> {
        let mut reader = VirtualStream::new(self, stream);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    fn write_ref(&self, stream: StreamRef, data: &[u8]) -> Result<(), MsfError> {
        let mut writer = VirtualStream::new(self, stream);
        writer.set_len(data.len() as u64)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Returns a stream by index.
    ///
    /// Requesting an index beyond the current stream count creates empty streams up to
    /// and including `index`. They are persisted on [`save`](Self::save).
    pub fn stream(&self, index: u32) -> VirtualStream<'_, S, F> {
        self.directory.lock().ensure_stream(index);
        VirtualStream::new(self, StreamRef::Stream(index))
    }

    /// Returns a stream by name, creating and registering an empty stream if the name
    /// is unknown.
    ///
    /// Names are matched exactly first, then ignoring ASCII case.
    pub fn named_stream(&self, name: &str) -> VirtualStream<'_, S, F> {
        let index = {
            let mut directory = self.directory.lock();
            let index = match directory.lookup(name) {
                Some(index) => index,
                None => {
                    let index = directory.streams.len() as u32;
                    directory.names.insert(name.to_owned(), index);
                    index
                }
            };
            directory.ensure_stream(index);
            index
        };

        VirtualStream::new(self, StreamRef::Stream(index))
    }

    /// Returns `true` if a stream with this index exists.
    pub fn stream_exists(&self, index: u32) -> bool {
        (index as usize) < self.directory.lock().streams.len()
    }

    /// Returns `true` if a stream with this name is registered.
    pub fn named_stream_exists(&self, name: &str) -> bool {
        self.directory.lock().lookup(name).is_some()
    }

    /// Returns the stream index registered for `name`.
    pub fn named_stream_index(&self, name: &str) -> Option<u32> {
        self.directory.lock().lookup(name)
    }

    /// Reads the full contents of a stream. Missing streams are empty.
    pub fn read_stream(&self, index: u32) -> Result<Vec<u8>, MsfError> {
        self.read_ref(StreamRef::Stream(index))
    }

    /// The number of streams in the directory.
    pub fn stream_count(&self) -> usize {
        self.directory.lock().streams.len()
    }

    /// Names of all registered named streams, in table order.
    pub fn stream_names(&self) -> Vec<String> {
        self.directory.lock().names.keys().cloned().collect()
    }

    /// The container header as currently held in memory.
    pub fn header(&self) -> MsfHeader {
        self.directory.lock().header
    }

    /// Consumes the container, returning the backing source.
    ///
    /// Changes that have not been written with [`save`](Self::save) are lost.
    pub fn into_inner(self) -> S {
        self.source.into_inner()
    }
}

impl<S, F> MsfFile<S, F> {
    /// The size of a page in bytes.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The PDB info header from stream 1.
    pub fn info(&self) -> &PdbInfo {
        &self.info
    }

    /// Format version of the PDB.
    pub fn version(&self) -> u32 {
        self.info.version
    }

    /// The signature of the PDB, usually a timestamp.
    pub fn signature(&self) -> u32 {
        self.info.signature
    }

    /// The age of the PDB.
    pub fn age(&self) -> u32 {
        self.info.age
    }

    /// The GUID of the PDB. Only 7.00 files carry one.
    pub fn guid(&self) -> Option<Uuid> {
        self.info.guid
    }

    /// The symbol server lookup identifier of the PDB.
    pub fn identifier(&self) -> String {
        self.info.identifier()
    }

    /// The debug identifier of the PDB.
    pub fn debug_id(&self) -> DebugId {
        self.info.debug_id()
    }

    pub(crate) fn directory(&self) -> &Mutex<Directory> {
        &self.directory
    }

    pub(crate) fn source(&self) -> &Mutex<S> {
        &self.source
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl<S, F: MsfFormat> fmt::Debug for MsfFile<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsfFile")
            .field("format", &F::NAME)
            .field("page_size", &self.page_size)
            .field("info", &self.info)
            .field("directory", &self.directory.lock())
            .finish()
    }
}

fn has_magic<F: MsfFormat, S: Read + Seek>(source: &mut S) -> Result<bool, MsfError> {
    source.seek(SeekFrom::Start(0))?;

    let mut magic = vec![0; F::MAGIC.len()];
    match source.read_exact(&mut magic) {
        Ok(()) => Ok(magic == F::MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_header<F: MsfFormat, S: Read + Seek>(source: &mut S) -> Result<MsfHeader, MsfError> {
    let mut data = vec![0; F::HEADER_SIZE];
    source.seek(SeekFrom::Start(F::MAGIC.len() as u64))?;
    source.read_exact(&mut data)?;
    let header = F::read_header(&data)?;

    if !header.page_size.is_power_of_two()
        || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&header.page_size)
    {
        return Err(MsfError::corrupt(format!(
            "invalid page size {}",
            header.page_size
        )));
    }

    if header.bitmap_page >= header.page_count {
        return Err(MsfError::corrupt("free page map outside of the file"));
    }

    let index_list_page = F::index_list_offset(&header) / u64::from(header.page_size);
    if index_list_page >= u64::from(header.page_count) {
        return Err(MsfError::corrupt("directory page list outside of the file"));
    }

    Ok(header)
}

fn read_bitmap<S: Read + Seek>(source: &mut S, header: &MsfHeader) -> Result<BitSet, MsfError> {
    let word_count = (header.page_count / 32) as usize;
    let offset = u64::from(header.bitmap_page) * u64::from(header.page_size);
    source.seek(SeekFrom::Start(offset))?;

    let mut data = Vec::new();
    source
        .by_ref()
        .take(word_count as u64 * 4)
        .read_to_end(&mut data)?;
    if data.len() < word_count * 4 {
        return Err(MsfError::corrupt("truncated free page map"));
    }

    let words = data
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(BitSet::from_words(words))
}

fn read_index_pages<F: MsfFormat, S: Read + Seek>(
    source: &mut S,
    header: &MsfHeader,
) -> Result<Vec<u32>, MsfError> {
    let count = (header.index_bytes as usize).div_ceil(header.page_size as usize);
    let len = count * F::PAGE_NUMBER_SIZE;
    if len > F::index_list_capacity(header) {
        return Err(MsfError::unsupported("directory page list exceeds one page"));
    }

    let mut data = vec![0; len];
    source.seek(SeekFrom::Start(F::index_list_offset(header)))?;
    source.read_exact(&mut data)?;

    let offset = &mut 0;
    let mut pages = Vec::with_capacity(count);
    for _ in 0..count {
        pages.push(checked_page(F::read_page_number(&data, offset)?, header)?);
    }
    Ok(pages)
}

fn parse_directory<F: MsfFormat>(
    data: &[u8],
    header: &MsfHeader,
) -> Result<Vec<StreamInfo>, MsfError> {
    let offset = &mut 0;
    let count = F::read_stream_count(data, offset)? as usize;
    if count > data.len() / 4 {
        return Err(MsfError::corrupt("stream count exceeds directory size"));
    }

    let mut sizes = Vec::with_capacity(count);
    for _ in 0..count {
        sizes.push(F::read_stream_size(data, offset)?);
    }

    let page_size = header.page_size as usize;
    let mut streams = Vec::with_capacity(count);
    for size in sizes {
        let page_count = if size == NIL_STREAM_SIZE {
            0
        } else {
            (size as usize).div_ceil(page_size)
        };

        if page_count > (data.len() - *offset) / F::PAGE_NUMBER_SIZE {
            return Err(MsfError::corrupt("stream page list exceeds directory size"));
        }

        let mut pages = Vec::with_capacity(page_count);
        for _ in 0..page_count {
            pages.push(checked_page(F::read_page_number(data, offset)?, header)?);
        }

        streams.push(StreamInfo { size, pages });
    }

    Ok(streams)
}

fn checked_page(page: u32, header: &MsfHeader) -> Result<u32, MsfError> {
    if page >= header.page_count {
        return Err(MsfError::corrupt(format!("page {page} outside of the file")));
    }
    Ok(page)
}
