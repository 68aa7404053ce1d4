//! OpenPGP signature packet inspection
//!
//! Only what is needed to learn which key produced a signature: packet framing
//! (old and new formats), v3 inline key ids and v4 issuer subpackets.

use crate::error::{SigHdrError, SigHdrResult};

const TAG_SIGNATURE: u8 = 2;
const SUBPACKET_CREATION_TIME: u8 = 2;
const SUBPACKET_ISSUER: u8 = 16;
const SUBPACKET_ISSUER_FINGERPRINT: u8 = 33;

/// Key id of the signer as 8 lowercase hex characters (low 32 bits).
pub fn sigpacket_key_id(packet: &[u8]) -> SigHdrResult<String> {
    let body = packet_body(packet)?;
    let key_id = match body.first() {
        Some(3) => v3_key_id(body)?,
        Some(4) => v4_key_id(body)?,
        Some(version) => {
            return Err(malformed(format!("unsupported signature version {}", version)))
        }
        None => return Err(malformed("empty signature packet")),
    };
    Ok(hex::encode(&key_id[4..]))
}

/// Build a minimal v4 signature packet issued by `key_id`.
pub fn build_sigpacket(key_id: [u8; 8]) -> Vec<u8> {
    let hashed = [5, SUBPACKET_CREATION_TIME, 0, 0, 0, 0];
    let mut unhashed = vec![9, SUBPACKET_ISSUER];
    unhashed.extend_from_slice(&key_id);

    // version, sigtype (binary), pubkey algo (RSA), hash algo (SHA256)
    let mut body = vec![4, 0x00, 1, 8];
    body.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
    body.extend_from_slice(&hashed);
    body.extend_from_slice(&(unhashed.len() as u16).to_be_bytes());
    body.extend_from_slice(&unhashed);
    // left 16 bits of hash, one 8-bit MPI
    body.extend_from_slice(&[0, 0, 0, 8, 0xff]);

    let mut packet = vec![0xC0 | TAG_SIGNATURE, body.len() as u8];
    packet.extend_from_slice(&body);
    packet
}

fn packet_body(packet: &[u8]) -> SigHdrResult<&[u8]> {
    let first = *packet.first().ok_or_else(|| malformed("empty packet"))?;
    if first & 0x80 == 0 {
        return Err(malformed("packet tag bit not set"));
    }

    let (tag, header_len, body_len) = if first & 0x40 != 0 {
        let tag = first & 0x3f;
        let o1 = *packet.get(1).ok_or_else(|| malformed("missing length"))? as usize;
        match o1 {
            0..=191 => (tag, 2, o1),
            192..=223 => {
                let o2 = *packet.get(2).ok_or_else(|| malformed("missing length"))? as usize;
                (tag, 3, ((o1 - 192) << 8) + o2 + 192)
            }
            255 => (tag, 6, be_len(packet.get(2..6))?),
            _ => return Err(malformed("partial body lengths are not supported")),
        }
    } else {
        let tag = (first >> 2) & 0x0f;
        match first & 0x03 {
            0 => (tag, 2, *packet.get(1).ok_or_else(|| malformed("missing length"))? as usize),
            1 => {
                let len = packet.get(1..3).ok_or_else(|| malformed("missing length"))?;
                (tag, 3, u16::from_be_bytes([len[0], len[1]]) as usize)
            }
            2 => (tag, 5, be_len(packet.get(1..5))?),
            _ => (tag, 1, packet.len() - 1),
        }
    };

    if tag != TAG_SIGNATURE {
        return Err(malformed(format!("packet tag {} is not a signature", tag)));
    }
    packet
        .get(header_len..header_len + body_len)
        .ok_or_else(|| malformed("packet body truncated"))
}

fn v3_key_id(body: &[u8]) -> SigHdrResult<[u8; 8]> {
    if body.get(1) != Some(&5) {
        return Err(malformed("v3 hashed material length must be 5"));
    }
    let id = body.get(7..15).ok_or_else(|| malformed("v3 signature truncated"))?;
    Ok(to_key_id(id))
}

fn v4_key_id(body: &[u8]) -> SigHdrResult<[u8; 8]> {
    let hashed_len = be_u16(body.get(4..6))?;
    let hashed = body
        .get(6..6 + hashed_len)
        .ok_or_else(|| malformed("hashed subpackets truncated"))?;
    let rest = &body[6 + hashed_len..];
    let unhashed_len = be_u16(rest.get(0..2))?;
    let unhashed = rest
        .get(2..2 + unhashed_len)
        .ok_or_else(|| malformed("unhashed subpackets truncated"))?;

    let mut fingerprint = None;
    for area in [hashed, unhashed] {
        for (kind, data) in subpackets(area)? {
            match kind {
                SUBPACKET_ISSUER if data.len() == 8 => return Ok(to_key_id(data)),
                SUBPACKET_ISSUER_FINGERPRINT if data.len() >= 9 && fingerprint.is_none() => {
                    fingerprint = Some(to_key_id(&data[data.len() - 8..]));
                }
                _ => {}
            }
        }
    }
    fingerprint.ok_or_else(|| malformed("no issuer subpacket"))
}

fn subpackets(mut area: &[u8]) -> SigHdrResult<Vec<(u8, &[u8])>> {
    let mut result = Vec::new();
    while !area.is_empty() {
        let o1 = area[0] as usize;
        let (header_len, len) = match o1 {
            0..=191 => (1, o1),
            192..=254 => {
                let o2 = *area.get(1).ok_or_else(|| malformed("subpacket length truncated"))? as usize;
                (2, ((o1 - 192) << 8) + o2 + 192)
            }
            _ => (5, be_len(area.get(1..5))?),
        };
        if len == 0 {
            return Err(malformed("zero-length subpacket"));
        }
        let sub = area
            .get(header_len..header_len + len)
            .ok_or_else(|| malformed("subpacket truncated"))?;
        result.push((sub[0] & 0x7f, &sub[1..]));
        area = &area[header_len + len..];
    }
    Ok(result)
}

fn to_key_id(bytes: &[u8]) -> [u8; 8] {
    let mut id = [0u8; 8];
    id.copy_from_slice(bytes);
    id
}

fn be_u16(bytes: Option<&[u8]>) -> SigHdrResult<usize> {
    let b = bytes.ok_or_else(|| malformed("length truncated"))?;
    Ok(u16::from_be_bytes([b[0], b[1]]) as usize)
}

fn be_len(bytes: Option<&[u8]>) -> SigHdrResult<usize> {
    let b = bytes.ok_or_else(|| malformed("length truncated"))?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
}

fn malformed(msg: impl Into<String>) -> SigHdrError {
    SigHdrError::MalformedPacket(msg.into())
}
