//! RPM signature header codec
//!
//! Reads, builds and replaces the signature header of an RPM package and
//! extracts the signing key id from the embedded OpenPGP signature packet.

pub mod error;
pub mod header;
pub mod lead;
pub mod pgp;

pub use error::{SigHdrError, SigHdrResult};
pub use header::{RawHeader, SigHeaderBuilder, HEADER_MAGIC, MAX_DATA_LENGTH, MAX_INDEX_COUNT, SIGTAG_GPG, SIGTAG_PGP};
pub use lead::{find_sighdr, rip_sighdr, splice_sighdr, LEAD_MAGIC, LEAD_SIZE};
pub use pgp::{build_sigpacket, sigpacket_key_id};

/// Signature tags carrying an OpenPGP packet, in lookup order.
pub const SIGNATURE_TAGS: [u32; 2] = [SIGTAG_GPG, SIGTAG_PGP];

/// Extract the lowercase signing key id from a raw signature header.
///
/// Returns an empty string for an unsigned header.
pub fn header_key_id(sighdr: &[u8]) -> SigHdrResult<String> {
    let header = RawHeader::parse(sighdr)?;
    let packet = SIGNATURE_TAGS.iter().find_map(|tag| header.get(*tag));
    match packet {
        Some(packet) => Ok(sigpacket_key_id(packet)?.to_lowercase()),
        None => Ok(String::new()),
    }
}
