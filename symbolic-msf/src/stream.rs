use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::MsfError;
use crate::file::MsfFile;
use crate::format::MsfFormat;

/// Identifies the stream a [`VirtualStream`] operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StreamRef {
    /// The stream holding the serialized directory.
    Index,
    /// A regular stream from the directory.
    Stream(u32),
}

/// A random access view over one stream of an [`MsfFile`].
///
/// Reads and writes go through a single page buffer. A modified page is written back
/// when the view moves to another page, on [`flush`](Write::flush), and when the view is
/// dropped. Writing past the end grows the stream by claiming free pages from the
/// container; [`set_len`](Self::set_len) also shrinks it.
///
/// Errors raised by the container surface as [`io::Error`]s wrapping an [`MsfError`],
/// which can be recovered with `MsfError::from`.
pub struct VirtualStream<'a, S, F>
where
    S: Read + Write + Seek,
    F: MsfFormat,
{
    file: &'a MsfFile<S, F>,
    stream: StreamRef,
    position: u64,
    page: Vec<u8>,
    loaded: Option<usize>,
    dirty: bool,
}

impl<'a, S, F> VirtualStream<'a, S, F>
where
    S: Read + Write + Seek,
    F: MsfFormat,
{
    pub(crate) fn new(file: &'a MsfFile<S, F>, stream: StreamRef) -> Self {
        Self {
            file,
            stream,
            position: 0,
            page: vec![0; file.page_size() as usize],
            loaded: None,
            dirty: false,
        }
    }

    /// The stream number, or `None` for the directory stream.
    pub fn index(&self) -> Option<u32> {
        match self.stream {
            StreamRef::Index => None,
            StreamRef::Stream(index) => Some(index),
        }
    }

    /// The length of the stream in bytes.
    pub fn len(&self) -> u64 {
        let directory = self.file.directory().lock();
        directory.stream(self.stream).map_or(0, |info| info.byte_len())
    }

    /// Returns `true` if the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current read and write position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Truncates or extends the stream.
    ///
    /// Pages beyond the new length are returned to the free page map. Bytes added by
    /// extending the stream read as zeros. The position is clamped to the new length.
    pub fn set_len(&mut self, len: u64) -> Result<(), MsfError> {
        let old_len = self.len();
        self.resize(len)?;
        if len > old_len {
            self.zero_range(old_len, len)?;
        }
        Ok(())
    }

    fn resize(&mut self, len: u64) -> Result<(), MsfError> {
        let size = u32::try_from(len)
            .ok()
            .filter(|&size| size != u32::MAX)
            .ok_or_else(|| MsfError::unsupported("stream length exceeds 4GB"))?;

        self.file.directory().lock().resize(self.stream, size)?;

        let page_count = len.div_ceil(self.page_size()) as usize;
        if self.loaded.is_some_and(|page| page >= page_count) {
            self.loaded = None;
            self.dirty = false;
        }

        self.position = self.position.min(len);
        Ok(())
    }

    /// Clears `from..to`, which must lie within the stream.
    ///
    /// Claimed pages may still hold the contents of a previously freed stream.
    fn zero_range(&mut self, from: u64, to: u64) -> Result<(), MsfError> {
        let len = self.len();
        let page_size = self.page_size();

        let mut offset = from;
        while offset < to {
            let page = (offset / page_size) as usize;
            let start = (offset % page_size) as usize;
            let n = (to - offset).min(page_size - start as u64) as usize;

            self.load_page(page, len, true)?;
            self.page[start..start + n].fill(0);
            self.dirty = true;
            offset += n as u64;
        }

        Ok(())
    }

    fn page_size(&self) -> u64 {
        self.page.len() as u64
    }

    fn physical_page(&self, page: usize) -> Result<u32, MsfError> {
        let directory = self.file.directory().lock();
        directory
            .stream(self.stream)
            .and_then(|info| info.pages.get(page).copied())
            .ok_or_else(|| MsfError::corrupt("page beyond the end of the stream"))
    }

    fn flush_page(&mut self) -> Result<(), MsfError> {
        let Some(page) = self.loaded.filter(|_| self.dirty) else {
            return Ok(());
        };

        let file = self.file;
        file.cancellation().check()?;
        let offset = u64::from(self.physical_page(page)?) * self.page_size();

        let mut source = file.source().lock();
        source.seek(SeekFrom::Start(offset))?;
        source.write_all(&self.page)?;

        self.dirty = false;
        Ok(())
    }

    /// Makes `page` the buffered page.
    ///
    /// A page that is not fully backed by the file is an error when reading. When writing,
    /// the remainder is zero-filled.
    fn load_page(&mut self, page: usize, len: u64, writing: bool) -> Result<(), MsfError> {
        if self.loaded == Some(page) {
            return Ok(());
        }

        self.flush_page()?;
        self.loaded = None;

        let file = self.file;
        file.cancellation().check()?;
        let page_size = self.page_size();
        let offset = u64::from(self.physical_page(page)?) * page_size;

        let mut filled = 0;
        {
            let mut source = file.source().lock();
            source.seek(SeekFrom::Start(offset))?;
            while filled < self.page.len() {
                match source.read(&mut self.page[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let needed = len.saturating_sub(page as u64 * page_size).min(page_size) as usize;
        if filled < needed && !writing {
            return Err(MsfError::corrupt("stream page beyond the end of the file"));
        }

        self.page[filled..].fill(0);
        self.loaded = Some(page);
        Ok(())
    }

    fn split_position(&self) -> (usize, usize) {
        let page_size = self.page_size();
        (
            (self.position / page_size) as usize,
            (self.position % page_size) as usize,
        )
    }
}

impl<S, F> Read for VirtualStream<'_, S, F>
where
    S: Read + Write + Seek,
    F: MsfFormat,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.len();
        let available = len.saturating_sub(self.position);
        let count = (buf.len() as u64).min(available) as usize;

        let mut done = 0;
        while done < count {
            let (page, offset) = self.split_position();
            self.load_page(page, len, false).map_err(MsfError::into_io)?;

            let n = (count - done).min(self.page.len() - offset);
            buf[done..done + n].copy_from_slice(&self.page[offset..offset + n]);
            done += n;
            self.position += n as u64;
        }

        Ok(done)
    }
}

impl<S, F> Write for VirtualStream<'_, S, F>
where
    S: Read + Write + Seek,
    F: MsfFormat,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let end = self.position + buf.len() as u64;
        let mut len = self.len();
        if end > len {
            self.resize(end).map_err(MsfError::into_io)?;
            if self.position > len {
                self.zero_range(len, self.position).map_err(MsfError::into_io)?;
            }
            len = end;
        }

        let mut done = 0;
        while done < buf.len() {
            let (page, offset) = self.split_position();
            self.load_page(page, len, true).map_err(MsfError::into_io)?;

            let n = (buf.len() - done).min(self.page.len() - offset);
            self.page[offset..offset + n].copy_from_slice(&buf[done..done + n]);
            self.dirty = true;
            done += n;
            self.position += n as u64;
        }

        Ok(done)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_page().map_err(MsfError::into_io)?;
        self.file.source().lock().flush()
    }
}

impl<S, F> Seek for VirtualStream<'_, S, F>
where
    S: Read + Write + Seek,
    F: MsfFormat,
{
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
        };

        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl<S, F> Drop for VirtualStream<'_, S, F>
where
    S: Read + Write + Seek,
    F: MsfFormat,
{
    fn drop(&mut self) {
        if let Err(error) = self.flush_page() {
            tracing::warn!(%error, "failed to flush stream page");
        }
    }
}

impl<S, F> fmt::Debug for VirtualStream<'_, S, F>
where
    S: Read + Write + Seek,
    F: MsfFormat,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualStream")
            .field("stream", &self.stream)
            .field("position", &self.position)
            .field("loaded", &self.loaded)
            .field("dirty", &self.dirty)
            .finish()
    }
}
