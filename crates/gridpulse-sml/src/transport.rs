//! SML transport v1 framing.
//!
//! A frame is: the 8-byte start sequence, the message stream padded with
//! zero bytes to a multiple of four (any 4-byte group equal to the escape
//! sequence is doubled), and the 8-byte trailer `1b 1b 1b 1b 1a <pad>
//! <crc16>`. The trailing FCS-16 covers everything from the first byte of
//! the frame through the padding-count byte.

use crate::crc::fcs16;
use crate::error::Error;

pub const ESCAPE: [u8; 4] = [0x1b, 0x1b, 0x1b, 0x1b];
pub const BEGIN: [u8; 8] = [0x1b, 0x1b, 0x1b, 0x1b, 0x01, 0x01, 0x01, 0x01];

/// Bytes of envelope on each side of the payload.
pub const ENVELOPE: usize = 8;

/// Wrap an encoded message stream in a transport frame.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let padding = (4 - payload.len() % 4) % 4;

    let mut padded = payload.to_vec();
    padded.resize(payload.len() + padding, 0x00);

    let mut out = Vec::with_capacity(padded.len() + 3 * ENVELOPE);
    out.extend_from_slice(&BEGIN);
    for group in padded.chunks(4) {
        if group == ESCAPE {
            out.extend_from_slice(&ESCAPE);
        }
        out.extend_from_slice(group);
    }
    out.extend_from_slice(&ESCAPE);
    out.push(0x1a);
    out.push(padding as u8);

    let crc = fcs16(&out);
    out.push((crc >> 8) as u8);
    out.push(crc as u8);
    out
}

/// Strip and verify a transport frame, returning the message stream with
/// escape doubling undone and padding removed.
pub fn unframe(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    if bytes.len() < 2 * ENVELOPE {
        return Err(Error::BadFrame("frame shorter than its envelope"));
    }
    if bytes.len() % 4 != 0 {
        return Err(Error::BadFrame("frame length not 4-byte aligned"));
    }
    if bytes[..ENVELOPE] != BEGIN {
        return Err(Error::BadFrame("missing start sequence"));
    }

    let trailer = &bytes[bytes.len() - ENVELOPE..];
    if trailer[..4] != ESCAPE || trailer[4] != 0x1a {
        return Err(Error::BadFrame("missing end sequence"));
    }

    let padding = trailer[5] as usize;
    if padding > 3 {
        return Err(Error::BadFrame("padding count out of range"));
    }

    let received = u16::from_be_bytes([trailer[6], trailer[7]]);
    let computed = fcs16(&bytes[..bytes.len() - 2]);
    if computed != received {
        return Err(Error::FrameCrcMismatch { computed, received });
    }

    let body = &bytes[ENVELOPE..bytes.len() - ENVELOPE];
    let mut payload = Vec::with_capacity(body.len());
    let mut groups = body.chunks_exact(4).peekable();
    while let Some(group) = groups.next() {
        if group == ESCAPE {
            // a doubled escape carries one literal escape group
            match groups.next() {
                Some(literal) if literal == ESCAPE => payload.extend_from_slice(literal),
                _ => return Err(Error::BadFrame("unescaped escape sequence in body")),
            }
        } else {
            payload.extend_from_slice(group);
        }
    }

    if payload.len() < padding {
        return Err(Error::BadFrame("padding exceeds body"));
    }
    payload.truncate(payload.len() - padding);
    Ok(payload)
}
