use crate::error::{EngineError, Result};

pub const MAGIC: [u8; 8] = *b"BLCAT\x00\x02\x00";
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 0;
pub const HEADER_SIZE: usize = 64;

/// Header flag: the body is LZ4 compressed (size-prepended block)
pub const FLAG_LZ4: u32 = 0x0000_0001;

/// Catalog snapshot header
///
/// The header occupies the first 64 bytes of a snapshot file and carries
/// everything needed to reject a bad file before touching the body:
/// magic, format version, table counts, body length and body checksum.
///
/// # Layout
///
/// ```text
/// Offset  Size  Field
///  0       8    magic "BLCAT\x00\x02\x00"
///  8       2    version_major
/// 10       2    version_minor
/// 12       4    flags
/// 16       4    item_type_count
/// 20       4    category_count
/// 24       4    color_count
/// 28       4    item_count
/// 32       8    body_len
/// 40       4    body_crc32
/// 44       8    created_at (unix seconds)
/// 52      12    reserved (zero)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 8],
    pub version_major: u16,
    pub version_minor: u16,
    pub flags: u32,
    pub item_type_count: u32,
    pub category_count: u32,
    pub color_count: u32,
    pub item_count: u32,
    /// Length of the (possibly compressed) body following the header
    pub body_len: u64,
    /// CRC32 of the body bytes as stored
    pub body_crc32: u32,
    pub created_at: i64,
}

impl SnapshotHeader {
    /// Create a new header with the current format version and no tables
    pub fn new() -> Self {
        SnapshotHeader {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            flags: 0,
            item_type_count: 0,
            category_count: 0,
            color_count: 0,
            item_count: 0,
            body_len: 0,
            body_crc32: 0,
            created_at: 0,
        }
    }

    /// Validate the header magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(EngineError::InvalidMagic);
        }

        // Exact match: indices inside the body are only meaningful to the
        // layout they were written with
        if self.version_major != VERSION_MAJOR || self.version_minor != VERSION_MINOR {
            return Err(EngineError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        if self.flags & !FLAG_LZ4 != 0 {
            return Err(EngineError::Corrupt(format!(
                "Unknown header flags: {:#x}",
                self.flags
            )));
        }

        Ok(())
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_LZ4 != 0
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.flags.to_le_bytes());
        bytes.extend_from_slice(&self.item_type_count.to_le_bytes());
        bytes.extend_from_slice(&self.category_count.to_le_bytes());
        bytes.extend_from_slice(&self.color_count.to_le_bytes());
        bytes.extend_from_slice(&self.item_count.to_le_bytes());
        bytes.extend_from_slice(&self.body_len.to_le_bytes());
        bytes.extend_from_slice(&self.body_crc32.to_le_bytes());
        bytes.extend_from_slice(&self.created_at.to_le_bytes());

        // Reserved
        bytes.resize(HEADER_SIZE, 0);

        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::Truncated {
                expected: HEADER_SIZE as u64,
                found: bytes.len() as u64,
            });
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);

        Ok(SnapshotHeader {
            magic,
            version_major: u16::from_le_bytes([bytes[8], bytes[9]]),
            version_minor: u16::from_le_bytes([bytes[10], bytes[11]]),
            flags: read_u32(bytes, 12),
            item_type_count: read_u32(bytes, 16),
            category_count: read_u32(bytes, 20),
            color_count: read_u32(bytes, 24),
            item_count: read_u32(bytes, 28),
            body_len: read_u64(bytes, 32),
            body_crc32: read_u32(bytes, 40),
            created_at: read_u64(bytes, 44) as i64,
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_creation() {
        let header = SnapshotHeader::new();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version_major, VERSION_MAJOR);
        assert_eq!(header.version_minor, VERSION_MINOR);
        assert!(!header.is_compressed());
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_invalid_magic() {
        let mut header = SnapshotHeader::new();
        header.magic = *b"INVALID!";
        assert!(matches!(header.validate(), Err(EngineError::InvalidMagic)));
    }

    #[test]
    fn test_invalid_version() {
        let mut header = SnapshotHeader::new();
        header.version_major = 1;
        assert!(matches!(
            header.validate(),
            Err(EngineError::UnsupportedVersion { major: 1, minor: 0 })
        ));
    }

    #[test]
    fn test_unknown_flags_rejected() {
        let mut header = SnapshotHeader::new();
        header.flags = 0x80;
        assert!(matches!(header.validate(), Err(EngineError::Corrupt(_))));
    }

    #[test]
    fn test_header_serialization() {
        let mut header = SnapshotHeader::new();
        header.flags = FLAG_LZ4;
        header.item_type_count = 3;
        header.category_count = 12;
        header.color_count = 150;
        header.item_count = 84_000;
        header.body_len = 7_340_032;
        header.body_crc32 = 0xdead_beef;
        header.created_at = 1_600_000_000;

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert!(bytes[52..].iter().all(|&b| b == 0));

        let deserialized = SnapshotHeader::from_bytes(&bytes).unwrap();
        assert_eq!(deserialized, header);
        assert!(deserialized.is_compressed());
    }

    #[test]
    fn test_short_input() {
        let bytes = [0u8; 10];
        assert!(matches!(
            SnapshotHeader::from_bytes(&bytes),
            Err(EngineError::Truncated {
                expected: 64,
                found: 10
            })
        ));
    }
}
