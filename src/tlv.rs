// tlv.rs — Locating the NDEF message TLV at the start of the tag data area

use crate::*;

/// Largest extended length accepted; bigger values are never seen on these tags.
pub const MAX_EXTENDED_LENGTH: u16 = 924;
/// Upper bound for the length of a second TLV directly following `03 FF`.
pub const MAX_ADJACENT_TLV_LENGTH: u8 = 100;

/// Offset of the NDEF TLV when a 5-byte lock/memory control TLV precedes it.
const SHIFTED_TLV_OFFSET: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlvKind {
    /// `03 LL`: one length byte.
    Fixed,
    /// `03 FF ..`: length byte was 0xFF and had to be interpreted.
    ExtendedAmbiguous,
}

/// Where the NDEF message sits, relative to the start of the scan window (page 4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlvDescriptor {
    pub message_length: u16,
    pub payload_start_offset: u8,
    pub kind: TlvKind,
}

impl TlvDescriptor {
    fn fixed(message_length: u16, payload_start_offset: u8) -> Self {
        Self {
            message_length,
            payload_start_offset,
            kind: TlvKind::Fixed,
        }
    }

    fn ambiguous(message_length: u16, payload_start_offset: u8) -> Self {
        Self {
            message_length,
            payload_start_offset,
            kind: TlvKind::ExtendedAmbiguous,
        }
    }

    /// Window offset one past the declared end of the message.
    pub fn message_end(&self) -> usize {
        self.payload_start_offset as usize + self.message_length as usize
    }
}

/// A factory-blank data area reads as all 0xFF.
pub fn is_ndef_formatted(window: &[u8]) -> bool {
    window.len() >= ULTRALIGHT_PAGE_SIZE && window[..ULTRALIGHT_PAGE_SIZE].iter().any(|b| *b != 0xFF)
}

/// Data area size in bytes from the capability container page (page 3).
pub fn tag_capacity(cc_page: &[u8]) -> usize {
    cc_page.get(2).map_or(0, |size| *size as usize * 8)
}

/// Find the NDEF TLV in `window`, the bytes read from page 4 onwards.
///
/// The tag does not tell which of the observed layouts is in use, so the
/// most specific interpretation is tried first:
///
/// * `03 LL` with `LL != FF`: fixed length.
/// * `03 FF 03 LL`: two abutting TLVs, the second length is used if it is
///   in `1..=100`, otherwise a literal length of 255.
/// * `03 FF HH LL`: a 16-bit length in `255..=924`, otherwise a literal 255.
/// * `?? ?? ?? ?? ?? 03 LL`: NDEF TLV behind a 5-byte control TLV.
pub fn locate_ndef_tlv(window: &[u8]) -> AppResult<TlvDescriptor> {
    if window.len() < 2 {
        return Err(AppError::format("no TLV found, window too short"));
    }

    if window[0] == NDEF_TLV_TAG {
        if window[1] != 0xFF {
            return Ok(TlvDescriptor::fixed(window[1] as u16, 2));
        }

        if window.len() < 4 {
            return Err(AppError::format("not enough data for 0xFF length"));
        }
        let (b2, b3) = (window[2], window[3]);
        let candidate = u16::from_be_bytes([b2, b3]);
        debug!("NDEF: 03 FF followed by {b2:02X} {b3:02X} (candidate length {candidate})");

        if b2 == NDEF_TLV_TAG {
            if b3 > 0 && b3 <= MAX_ADJACENT_TLV_LENGTH {
                debug!("NDEF: treating as adjacent TLVs, length {b3}");
                return Ok(TlvDescriptor::ambiguous(b3 as u16, 4));
            }
            debug!("NDEF: adjacent TLV length {b3} implausible, literal 255");
            return Ok(TlvDescriptor::ambiguous(0xFF, 2));
        }

        if candidate > 254 && candidate <= MAX_EXTENDED_LENGTH {
            debug!("NDEF: extended length {candidate}");
            return Ok(TlvDescriptor::ambiguous(candidate, 4));
        }

        debug!("NDEF: treating 0xFF as literal length 255");
        return Ok(TlvDescriptor::ambiguous(0xFF, 2));
    }

    if window.get(SHIFTED_TLV_OFFSET) == Some(&NDEF_TLV_TAG) {
        let Some(length) = window.get(SHIFTED_TLV_OFFSET + 1) else {
            return Err(AppError::format("not enough data for NDEF TLV at offset 5"));
        };
        return Ok(TlvDescriptor::fixed(*length as u16, SHIFTED_TLV_OFFSET as u8 + 2));
    }

    Err(AppError::format(format!(
        "no TLV found in {}",
        format_bytes(&window[..window.len().min(8)])
    )))
}


// EOF
