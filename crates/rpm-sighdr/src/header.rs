//! Header structure parsing and construction
//!
//! A header is a 16-byte preamble (magic, reserved, index count, data length)
//! followed by 16-byte index entries and a data store. Only BIN entries are
//! exposed by value; signature packets are always stored as BIN.

use crate::error::{SigHdrError, SigHdrResult};

/// Header magic plus version byte
pub const HEADER_MAGIC: [u8; 4] = [0x8e, 0xad, 0xe8, 0x01];

/// Size of the fixed header preamble
pub const PREAMBLE_SIZE: usize = 16;

/// Size of one index entry
pub const ENTRY_SIZE: usize = 16;

/// PGP signature of header+payload (RSA/DSA legacy)
pub const SIGTAG_PGP: u32 = 1002;

/// GPG signature of header+payload
pub const SIGTAG_GPG: u32 = 1005;

/// Header entry type for opaque binary data
pub const TYPE_BIN: u32 = 7;

/// Largest index count rpm itself accepts
pub const MAX_INDEX_COUNT: usize = 0xffff;

/// Largest data store rpm itself accepts (256 MiB)
pub const MAX_DATA_LENGTH: usize = 256 * 1024 * 1024;

/// Unpadded header size for the given index count and data length
pub fn header_size(il: usize, dl: usize) -> Option<usize> {
    il.checked_mul(ENTRY_SIZE)?
        .checked_add(PREAMBLE_SIZE)?
        .checked_add(dl)
}

/// Unpadded header size, rejecting counts beyond rpm's limits.
pub fn bounded_header_size(il: usize, dl: usize) -> SigHdrResult<usize> {
    if il > MAX_INDEX_COUNT || dl > MAX_DATA_LENGTH {
        return Err(SigHdrError::TooLarge {
            index_count: il,
            data_length: dl,
        });
    }
    header_size(il, dl).ok_or(SigHdrError::TooLarge {
        index_count: il,
        data_length: dl,
    })
}

/// Round a size up to the 8-byte boundary used on disk
pub fn padded(size: usize) -> usize {
    size + (8 - size % 8) % 8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    tag: u32,
    kind: u32,
    offset: usize,
    count: usize,
}

/// Parsed view over raw header bytes
#[derive(Debug, Clone)]
pub struct RawHeader<'a> {
    entries: Vec<IndexEntry>,
    data: &'a [u8],
}

impl<'a> RawHeader<'a> {
    /// Parse a header; trailing bytes (alignment padding) are ignored.
    pub fn parse(bytes: &'a [u8]) -> SigHdrResult<Self> {
        if bytes.len() < PREAMBLE_SIZE {
            return Err(SigHdrError::Truncated {
                needed: PREAMBLE_SIZE,
                available: bytes.len(),
            });
        }
        if bytes[..4] != HEADER_MAGIC {
            return Err(SigHdrError::BadMagic { offset: 0 });
        }

        let il = be_u32(&bytes[8..12]) as usize;
        let dl = be_u32(&bytes[12..16]) as usize;
        let needed = bounded_header_size(il, dl)?;
        if bytes.len() < needed {
            return Err(SigHdrError::Truncated {
                needed,
                available: bytes.len(),
            });
        }

        let data_start = PREAMBLE_SIZE + il * ENTRY_SIZE;
        let data = &bytes[data_start..data_start + dl];

        let mut entries = Vec::with_capacity(il);
        for index in 0..il {
            let raw = &bytes[PREAMBLE_SIZE + index * ENTRY_SIZE..PREAMBLE_SIZE + (index + 1) * ENTRY_SIZE];
            let offset = be_u32(&raw[8..12]) as i32;
            if offset < 0 {
                return Err(SigHdrError::EntryOutOfBounds { index });
            }
            entries.push(IndexEntry {
                tag: be_u32(&raw[0..4]),
                kind: be_u32(&raw[4..8]),
                offset: offset as usize,
                count: be_u32(&raw[12..16]) as usize,
            });
        }

        for (index, entry) in entries.iter().enumerate() {
            if entry.kind == TYPE_BIN {
                let end = entry.offset.checked_add(entry.count);
                if end.map_or(true, |end| end > data.len()) {
                    return Err(SigHdrError::EntryOutOfBounds { index });
                }
            }
        }

        Ok(Self { entries, data })
    }

    /// BIN payload stored under `tag`, if any.
    pub fn get(&self, tag: u32) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .find(|e| e.tag == tag && e.kind == TYPE_BIN)
            .map(|e| &self.data[e.offset..e.offset + e.count])
    }

    /// Tags present in index order
    pub fn tags(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|e| e.tag)
    }
}

/// Builds a signature header out of BIN entries.
#[derive(Debug, Default, Clone)]
pub struct SigHeaderBuilder {
    entries: Vec<(u32, Vec<u8>)>,
}

impl SigHeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a BIN entry
    pub fn bin(mut self, tag: u32, value: impl Into<Vec<u8>>) -> Self {
        self.entries.push((tag, value.into()));
        self
    }

    /// Serialize, padded to the on-disk 8-byte boundary.
    pub fn build(&self) -> Vec<u8> {
        let dl: usize = self.entries.iter().map(|(_, v)| v.len()).sum();
        let mut out = Vec::with_capacity(padded(PREAMBLE_SIZE + self.entries.len() * ENTRY_SIZE + dl));
        out.extend_from_slice(&HEADER_MAGIC);
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(dl as u32).to_be_bytes());

        let mut offset = 0u32;
        for (tag, value) in &self.entries {
            out.extend_from_slice(&tag.to_be_bytes());
            out.extend_from_slice(&TYPE_BIN.to_be_bytes());
            out.extend_from_slice(&offset.to_be_bytes());
            out.extend_from_slice(&(value.len() as u32).to_be_bytes());
            offset += value.len() as u32;
        }
        for (_, value) in &self.entries {
            out.extend_from_slice(value);
        }

        out.resize(padded(out.len()), 0);
        out
    }
}

pub(crate) fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_then_parse() {
        let bytes = SigHeaderBuilder::new()
            .bin(SIGTAG_GPG, vec![1, 2, 3])
            .bin(1004, vec![9; 16])
            .build();

        assert_eq!(bytes.len() % 8, 0);
        let header = RawHeader::parse(&bytes).unwrap();
        assert_eq!(header.get(SIGTAG_GPG), Some(&[1u8, 2, 3][..]));
        assert_eq!(header.get(1004).map(|v| v.len()), Some(16));
        assert_eq!(header.get(SIGTAG_PGP), None);
        assert_eq!(header.tags().collect::<Vec<_>>(), vec![SIGTAG_GPG, 1004]);
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let mut bytes = SigHeaderBuilder::new().bin(1000, vec![0; 4]).build();
        bytes[0] = 0;
        assert!(matches!(
            RawHeader::parse(&bytes),
            Err(SigHdrError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_truncated_data() {
        let bytes = SigHeaderBuilder::new().bin(1000, vec![7; 40]).build();
        let result = RawHeader::parse(&bytes[..30]);
        assert!(matches!(result, Err(SigHdrError::Truncated { .. })));
    }

    #[test]
    fn test_parse_rejects_entry_outside_store() {
        let mut bytes = SigHeaderBuilder::new().bin(1000, vec![7; 8]).build();
        // count field of the first entry
        bytes[PREAMBLE_SIZE + 12..PREAMBLE_SIZE + 16].copy_from_slice(&64u32.to_be_bytes());
        assert!(matches!(
            RawHeader::parse(&bytes),
            Err(SigHdrError::EntryOutOfBounds { index: 0 })
        ));
    }

    #[test]
    fn test_parse_rejects_counts_beyond_rpm_limits() {
        let mut bytes = SigHeaderBuilder::new().bin(1000, vec![7; 8]).build();
        bytes[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
        bytes[12..16].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            RawHeader::parse(&bytes),
            Err(SigHdrError::TooLarge { .. })
        ));

        assert!(bounded_header_size(MAX_INDEX_COUNT, MAX_DATA_LENGTH).is_ok());
        assert!(bounded_header_size(MAX_INDEX_COUNT + 1, 0).is_err());
    }

    #[test]
    fn test_padded() {
        assert_eq!(padded(16), 16);
        assert_eq!(padded(17), 24);
        assert_eq!(padded(23), 24);
    }
}
