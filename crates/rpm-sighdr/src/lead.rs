//! Package-level access: lead, signature header location, splicing

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{SigHdrError, SigHdrResult};
use crate::header::{be_u32, bounded_header_size, padded, RawHeader, HEADER_MAGIC, PREAMBLE_SIZE};

/// Size of the fixed RPM lead
pub const LEAD_SIZE: usize = 96;

/// Magic bytes at the start of every RPM
pub const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];

/// Locate the signature header: returns `(start, padded_size)`.
pub fn find_sighdr<R: Read + Seek>(reader: &mut R) -> SigHdrResult<(u64, usize)> {
    reader.seek(SeekFrom::Start(0))?;

    let mut lead = [0u8; LEAD_SIZE];
    read_exact_or_truncated(reader, &mut lead, 0)?;
    if lead[..4] != LEAD_MAGIC {
        return Err(SigHdrError::BadLead);
    }

    let mut preamble = [0u8; PREAMBLE_SIZE];
    read_exact_or_truncated(reader, &mut preamble, LEAD_SIZE)?;
    if preamble[..4] != HEADER_MAGIC {
        return Err(SigHdrError::BadMagic {
            offset: LEAD_SIZE as u64,
        });
    }

    let il = be_u32(&preamble[8..12]) as usize;
    let dl = be_u32(&preamble[12..16]) as usize;
    let size = padded(bounded_header_size(il, dl)?);

    // the whole header must be on disk before anyone allocates for it
    let available = reader.seek(SeekFrom::End(0))?;
    let needed = LEAD_SIZE as u64 + size as u64;
    if needed > available {
        return Err(SigHdrError::Truncated {
            needed: needed as usize,
            available: available as usize,
        });
    }

    Ok((LEAD_SIZE as u64, size))
}

/// Read the padded signature header bytes of the package at `path`.
pub fn rip_sighdr(path: &Path) -> SigHdrResult<Vec<u8>> {
    let mut file = BufReader::new(File::open(path)?);
    let (start, size) = find_sighdr(&mut file)?;

    file.seek(SeekFrom::Start(start))?;
    let mut sighdr = vec![0u8; size];
    read_exact_or_truncated(&mut file, &mut sighdr, start as usize)?;
    Ok(sighdr)
}

/// Write `dst` as a copy of `src` carrying `sighdr` as its signature header.
///
/// The lead and everything after the original signature header are copied
/// byte for byte.
pub fn splice_sighdr(src: &Path, dst: &Path, sighdr: &[u8]) -> SigHdrResult<()> {
    RawHeader::parse(sighdr)?;

    let mut input = BufReader::new(File::open(src)?);
    let (start, size) = find_sighdr(&mut input)?;

    let mut output = BufWriter::new(File::create(dst)?);

    input.seek(SeekFrom::Start(0))?;
    let mut lead = vec![0u8; start as usize];
    input.read_exact(&mut lead)?;
    output.write_all(&lead)?;
    output.write_all(sighdr)?;

    input.seek(SeekFrom::Start(start + size as u64))?;
    io::copy(&mut input, &mut output)?;
    output.flush()?;
    Ok(())
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8], at: usize) -> SigHdrResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SigHdrError::Truncated {
            needed: at + buf.len(),
            available: at,
        },
        _ => SigHdrError::Io(e),
    })
}
