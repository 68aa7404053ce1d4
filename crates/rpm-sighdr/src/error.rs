//! Errors for signature header handling.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigHdrError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not an RPM package: bad lead magic")]
    BadLead,

    #[error("bad header magic at offset {offset}")]
    BadMagic { offset: u64 },

    #[error("truncated header: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("header too large: {index_count} index entries, {data_length} data bytes")]
    TooLarge { index_count: usize, data_length: usize },

    #[error("index entry {index} points outside the data store")]
    EntryOutOfBounds { index: usize },

    #[error("malformed signature packet: {0}")]
    MalformedPacket(String),
}

pub type SigHdrResult<T> = Result<T, SigHdrError>;
