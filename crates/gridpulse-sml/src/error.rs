use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("buffer too small: {0} bytes needed, {1} bytes available")]
    BufferTooSmall(usize, usize),

    #[error("invalid type-length field: {0:#04x}")]
    InvalidTypeLength(u8),

    #[error("type-length field exceeds 4 bytes")]
    OverlongTypeLength,

    #[error("expected {expected}, found element of type {found:#03x}")]
    UnexpectedElement { expected: &'static str, found: u8 },

    #[error("expected a list of {0} entries, found {1}")]
    WrongListLength(usize, usize),

    #[error("integer of {0} bytes is not representable")]
    IntegerWidth(usize),

    #[error("value does not fit in {0}")]
    IntegerRange(&'static str),

    #[error("message checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    CrcMismatch { computed: u16, received: u16 },

    #[error("missing end-of-message marker, found {0:#04x}")]
    MissingEndMarker(u8),

    #[error("malformed transport frame: {0}")]
    BadFrame(&'static str),

    #[error("frame checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    FrameCrcMismatch { computed: u16, received: u16 },

    #[error("invalid hex string: {0}")]
    InvalidHex(#[from] data_encoding::DecodeError),
}
