//! On-disk layouts of the two MSF container versions.
//!
//! Both versions share the same page model and differ only in the width of
//! their fields:
//!
//! | structure            | 7.00                      | 2.00                              |
//! |----------------------|---------------------------|-----------------------------------|
//! | magic                | 32 bytes                  | 44 bytes                          |
//! | header               | six `u32`                 | `u32`, two `u16`, two `u32`       |
//! | index page list      | on the index page         | inline, right after the header    |
//! | directory entry      | `u32` size                | `u32` size, `u32` reserved        |
//! | page number          | `u32`                     | `u16`                             |
//! | PDB info header      | version, sig, age, GUID   | version, sig, age                 |

use std::fmt;

use scroll::{Pread, LE};

use symbolic_common::{DebugId, Uuid};

use crate::error::MsfError;

/// Magic bytes of the 7.00 container.
pub const MSF70_MAGIC: &[u8] = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0";

/// Magic bytes of the 2.00 container.
pub const MSF20_MAGIC: &[u8] = b"Microsoft C/C++ program database 2.00\r\n\x1aJG\0\0";

/// The size value of a stream that does not exist.
pub const NIL_STREAM_SIZE: u32 = u32::MAX;

/// The container header, widened to 32-bit fields for both versions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MsfHeader {
    /// Size of a page in bytes.
    pub page_size: u32,
    /// Page holding the free page map.
    pub bitmap_page: u32,
    /// Number of pages in the file.
    pub page_count: u32,
    /// Size of the stream directory in bytes.
    pub index_bytes: u32,
    /// Unused.
    pub reserved: u32,
    /// Page holding the list of directory pages (7.00 only).
    pub index_page: u32,
}

/// The header of the PDB info stream (stream 1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PdbInfo {
    /// Format version, for instance `20000404`.
    pub version: u32,
    /// Timestamp-like signature.
    pub signature: u32,
    /// Number of times the PDB was written.
    pub age: u32,
    /// Unique identifier of the PDB, absent in 2.00 files.
    pub guid: Option<Uuid>,
}

impl PdbInfo {
    /// The lookup identifier of this PDB.
    ///
    /// For 7.00 files this is the GUID in its on-disk byte order as lowercase hex,
    /// directly followed by the age in decimal. 2.00 files use the signature as eight
    /// hex digits instead of the GUID.
    pub fn identifier(&self) -> String {
        match self.guid {
            Some(guid) => {
                let mut id = String::with_capacity(40);
                for byte in guid.to_bytes_le() {
                    id.push_str(&format!("{byte:02x}"));
                }
                id.push_str(&self.age.to_string());
                id
            }
            None => format!("{:08x}{}", self.signature, self.age),
        }
    }

    /// The debug identifier of this PDB.
    pub fn debug_id(&self) -> DebugId {
        match self.guid {
            Some(guid) => DebugId::from_parts(guid, self.age),
            None => {
                let uuid = Uuid::from_fields(self.signature, 0, 0, &[0; 8]);
                DebugId::from_parts(uuid, self.age)
            }
        }
    }
}

/// Describes the layout of one MSF container version.
pub trait MsfFormat: fmt::Debug + Send + Sync + 'static {
    /// Human readable version name.
    const NAME: &'static str;
    /// Magic bytes at the very start of the file.
    const MAGIC: &'static [u8];
    /// Size of the header following the magic.
    const HEADER_SIZE: usize;
    /// Size of a page number in page lists.
    const PAGE_NUMBER_SIZE: usize;
    /// Size of the PDB info header at the start of stream 1.
    const INFO_SIZE: usize;

    /// Parses the header from the bytes following the magic.
    fn read_header(data: &[u8]) -> Result<MsfHeader, MsfError>;

    /// Serializes the header, excluding the magic.
    fn write_header(header: &MsfHeader, out: &mut Vec<u8>) -> Result<(), MsfError>;

    /// File offset of the list of pages holding the stream directory.
    fn index_list_offset(header: &MsfHeader) -> u64;

    /// Number of bytes available to the index page list.
    fn index_list_capacity(header: &MsfHeader) -> usize;

    /// Reads the stream count at the start of the directory.
    fn read_stream_count(data: &[u8], offset: &mut usize) -> Result<u32, MsfError>;

    /// Writes the stream count at the start of the directory.
    fn write_stream_count(count: u32, out: &mut Vec<u8>) -> Result<(), MsfError>;

    /// Reads one stream size of the directory.
    fn read_stream_size(data: &[u8], offset: &mut usize) -> Result<u32, MsfError>;

    /// Writes one stream size of the directory.
    fn write_stream_size(size: u32, out: &mut Vec<u8>);

    /// Reads a page number from a page list.
    fn read_page_number(data: &[u8], offset: &mut usize) -> Result<u32, MsfError>;

    /// Writes a page number to a page list.
    fn write_page_number(page: u32, out: &mut Vec<u8>) -> Result<(), MsfError>;

    /// Parses the PDB info header.
    fn read_info(data: &[u8], offset: &mut usize) -> Result<PdbInfo, MsfError>;

    /// Serializes the PDB info header.
    fn write_info(info: &PdbInfo, out: &mut Vec<u8>);
}

/// The 7.00 container used by all current toolchains.
#[derive(Clone, Copy, Debug, Default)]
pub struct Msf70;

impl MsfFormat for Msf70 {
    const NAME: &'static str = "MSF 7.00";
    const MAGIC: &'static [u8] = MSF70_MAGIC;
    const HEADER_SIZE: usize = 24;
    const PAGE_NUMBER_SIZE: usize = 4;
    const INFO_SIZE: usize = 28;

    fn read_header(data: &[u8]) -> Result<MsfHeader, MsfError> {
        let offset = &mut 0;
        Ok(MsfHeader {
            page_size: data.gread_with(offset, LE)?,
            bitmap_page: data.gread_with(offset, LE)?,
            page_count: data.gread_with(offset, LE)?,
            index_bytes: data.gread_with(offset, LE)?,
            reserved: data.gread_with(offset, LE)?,
            index_page: data.gread_with(offset, LE)?,
        })
    }

    fn write_header(header: &MsfHeader, out: &mut Vec<u8>) -> Result<(), MsfError> {
        for value in [
            header.page_size,
            header.bitmap_page,
            header.page_count,
            header.index_bytes,
            header.reserved,
            header.index_page,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    fn index_list_offset(header: &MsfHeader) -> u64 {
        u64::from(header.index_page) * u64::from(header.page_size)
    }

    fn index_list_capacity(header: &MsfHeader) -> usize {
        header.page_size as usize
    }

    fn read_stream_count(data: &[u8], offset: &mut usize) -> Result<u32, MsfError> {
        let count: i32 = data.gread_with(offset, LE)?;
        u32::try_from(count).map_err(|_| MsfError::corrupt("negative stream count"))
    }

    fn write_stream_count(count: u32, out: &mut Vec<u8>) -> Result<(), MsfError> {
        out.extend_from_slice(&count.to_le_bytes());
        Ok(())
    }

    fn read_stream_size(data: &[u8], offset: &mut usize) -> Result<u32, MsfError> {
        Ok(data.gread_with(offset, LE)?)
    }

    fn write_stream_size(size: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&size.to_le_bytes());
    }

    fn read_page_number(data: &[u8], offset: &mut usize) -> Result<u32, MsfError> {
        Ok(data.gread_with(offset, LE)?)
    }

    fn write_page_number(page: u32, out: &mut Vec<u8>) -> Result<(), MsfError> {
        out.extend_from_slice(&page.to_le_bytes());
        Ok(())
    }

    fn read_info(data: &[u8], offset: &mut usize) -> Result<PdbInfo, MsfError> {
        let version = data.gread_with(offset, LE)?;
        let signature = data.gread_with(offset, LE)?;
        let age = data.gread_with(offset, LE)?;
        let guid: &[u8] = data.gread_with(offset, 16)?;
        let mut bytes = [0; 16];
        bytes.copy_from_slice(guid);

        Ok(PdbInfo {
            version,
            signature,
            age,
            guid: Some(Uuid::from_bytes_le(bytes)),
        })
    }

    fn write_info(info: &PdbInfo, out: &mut Vec<u8>) {
        out.extend_from_slice(&info.version.to_le_bytes());
        out.extend_from_slice(&info.signature.to_le_bytes());
        out.extend_from_slice(&info.age.to_le_bytes());
        out.extend_from_slice(&info.guid.unwrap_or_default().to_bytes_le());
    }
}

/// The legacy 2.00 container, also known as the "JG" format.
#[derive(Clone, Copy, Debug, Default)]
pub struct Msf20;

impl MsfFormat for Msf20 {
    const NAME: &'static str = "MSF 2.00";
    const MAGIC: &'static [u8] = MSF20_MAGIC;
    const HEADER_SIZE: usize = 16;
    const PAGE_NUMBER_SIZE: usize = 2;
    const INFO_SIZE: usize = 12;

    fn read_header(data: &[u8]) -> Result<MsfHeader, MsfError> {
        let offset = &mut 0;
        let page_size = data.gread_with(offset, LE)?;
        let bitmap_page: u16 = data.gread_with(offset, LE)?;
        let page_count: u16 = data.gread_with(offset, LE)?;
        let index_bytes = data.gread_with(offset, LE)?;
        let reserved = data.gread_with(offset, LE)?;

        Ok(MsfHeader {
            page_size,
            bitmap_page: bitmap_page.into(),
            page_count: page_count.into(),
            index_bytes,
            reserved,
            index_page: 0,
        })
    }

    fn write_header(header: &MsfHeader, out: &mut Vec<u8>) -> Result<(), MsfError> {
        let bitmap_page = u16::try_from(header.bitmap_page)
            .map_err(|_| MsfError::unsupported("bitmap page out of range for MSF 2.00"))?;
        let page_count = u16::try_from(header.page_count)
            .map_err(|_| MsfError::unsupported("too many pages for MSF 2.00"))?;

        out.extend_from_slice(&header.page_size.to_le_bytes());
        out.extend_from_slice(&bitmap_page.to_le_bytes());
        out.extend_from_slice(&page_count.to_le_bytes());
        out.extend_from_slice(&header.index_bytes.to_le_bytes());
        out.extend_from_slice(&header.reserved.to_le_bytes());
        Ok(())
    }

    fn index_list_offset(_header: &MsfHeader) -> u64 {
        (Self::MAGIC.len() + Self::HEADER_SIZE) as u64
    }

    fn index_list_capacity(header: &MsfHeader) -> usize {
        (header.page_size as usize).saturating_sub(Self::MAGIC.len() + Self::HEADER_SIZE)
    }

    fn read_stream_count(data: &[u8], offset: &mut usize) -> Result<u32, MsfError> {
        let count: u16 = data.gread_with(offset, LE)?;
        let _reserved: u16 = data.gread_with(offset, LE)?;
        Ok(count.into())
    }

    fn write_stream_count(count: u32, out: &mut Vec<u8>) -> Result<(), MsfError> {
        let count = u16::try_from(count)
            .map_err(|_| MsfError::unsupported("too many streams for MSF 2.00"))?;
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&[0; 2]);
        Ok(())
    }

    fn read_stream_size(data: &[u8], offset: &mut usize) -> Result<u32, MsfError> {
        let size = data.gread_with(offset, LE)?;
        let _reserved: u32 = data.gread_with(offset, LE)?;
        Ok(size)
    }

    fn write_stream_size(size: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
    }

    fn read_page_number(data: &[u8], offset: &mut usize) -> Result<u32, MsfError> {
        let page: u16 = data.gread_with(offset, LE)?;
        Ok(page.into())
    }

    fn write_page_number(page: u32, out: &mut Vec<u8>) -> Result<(), MsfError> {
        let page = u16::try_from(page)
            .map_err(|_| MsfError::unsupported("page number out of range for MSF 2.00"))?;
        out.extend_from_slice(&page.to_le_bytes());
        Ok(())
    }

    fn read_info(data: &[u8], offset: &mut usize) -> Result<PdbInfo, MsfError> {
        Ok(PdbInfo {
            version: data.gread_with(offset, LE)?,
            signature: data.gread_with(offset, LE)?,
            age: data.gread_with(offset, LE)?,
            guid: None,
        })
    }

    fn write_info(info: &PdbInfo, out: &mut Vec<u8>) {
        out.extend_from_slice(&info.version.to_le_bytes());
        out.extend_from_slice(&info.signature.to_le_bytes());
        out.extend_from_slice(&info.age.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_lengths() {
        assert_eq!(Msf70::MAGIC.len(), 32);
        assert_eq!(Msf20::MAGIC.len(), 44);
    }

    #[test]
    fn test_header_layout_70() {
        let header = MsfHeader {
            page_size: 4096,
            bitmap_page: 1,
            page_count: 77,
            index_bytes: 336,
            reserved: 0,
            index_page: 76,
        };

        let mut buf = Vec::new();
        Msf70::write_header(&header, &mut buf).unwrap();
        assert_eq!(buf.len(), Msf70::HEADER_SIZE);
        assert_eq!(&buf[..8], &[0, 0x10, 0, 0, 1, 0, 0, 0]);
        assert_eq!(Msf70::read_header(&buf).unwrap(), header);
        assert_eq!(Msf70::index_list_offset(&header), 76 * 4096);
    }

    #[test]
    fn test_header_layout_20() {
        let header = MsfHeader {
            page_size: 1024,
            bitmap_page: 1,
            page_count: 300,
            index_bytes: 96,
            reserved: 0,
            index_page: 0,
        };

        let mut buf = Vec::new();
        Msf20::write_header(&header, &mut buf).unwrap();
        assert_eq!(buf.len(), Msf20::HEADER_SIZE);
        assert_eq!(&buf[4..8], &[1, 0, 0x2c, 0x01]);
        assert_eq!(Msf20::read_header(&buf).unwrap(), header);
        assert_eq!(Msf20::index_list_offset(&header), 60);
        assert_eq!(Msf20::index_list_capacity(&header), 1024 - 60);
    }

    #[test]
    fn test_header_20_overflow() {
        let header = MsfHeader {
            page_size: 1024,
            page_count: 70_000,
            ..Default::default()
        };
        assert!(Msf20::write_header(&header, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_identifier_70() {
        let guid = Uuid::parse_str("b59bba63-2d99-42fc-9f6b-cc52135dbb09").unwrap();
        let info = PdbInfo {
            version: 20000404,
            signature: 0x555c_e245,
            age: 1,
            guid: Some(guid),
        };

        assert_eq!(info.identifier(), "63ba9bb5992dfc429f6bcc52135dbb091");
        assert_eq!(
            info.debug_id().to_string(),
            "b59bba63-2d99-42fc-9f6b-cc52135dbb09-1"
        );
    }

    #[test]
    fn test_identifier_20() {
        let info = PdbInfo {
            version: 19941610,
            signature: 0x3a2b_1c0d,
            age: 12,
            guid: None,
        };
        assert_eq!(info.identifier(), "3a2b1c0d12");
    }

    #[test]
    fn test_info_round_trip_70() {
        let info = PdbInfo {
            version: 20000404,
            signature: 7,
            age: 3,
            guid: Some(Uuid::from_bytes_le([
                1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
            ])),
        };

        let mut buf = Vec::new();
        Msf70::write_info(&info, &mut buf);
        assert_eq!(buf.len(), Msf70::INFO_SIZE);
        assert_eq!(&buf[12..], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(Msf70::read_info(&buf, &mut 0).unwrap(), info);
    }
}
