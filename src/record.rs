// record.rs — Finding NDEF records inside a recovered message

use std::ops::Range;

use crate::*;

pub const NDEF_MAX_TYPE_LENGTH: u8 = 8;
/// Short-record payload lengths at or above this are treated as noise.
pub const NDEF_MAX_PAYLOAD_LENGTH: u8 = 200;

const FLAG_SR: u8 = 0b0001_0000;
const FLAG_IL: u8 = 0b0000_1000;
const TNF_MASK: u8 = 0b0000_0111;
const TNF_MAX: u8 = 6;
const TNF_WELL_KNOWN: u8 = 1;
const TEXT_RECORD_TYPE: &[u8] = b"T";
const TEXT_LANG_LEN_MASK: u8 = 0b0011_1111;

/// Header bytes that plausibly start a short NDEF record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordCandidate {
    pub offset: usize,
    pub flags: u8,
    pub type_length: u8,
    pub payload_length: u8,
    pub id_length: u8,
    pub total_size: u32,
}

impl RecordCandidate {
    /// Check for a record header at `bytes[offset..]`.
    pub fn at(bytes: &[u8], offset: usize) -> Option<Self> {
        let header = bytes.get(offset..)?;
        let flags = *header.first()?;
        if flags & TNF_MASK > TNF_MAX || flags & FLAG_SR == 0 {
            return None;
        }
        let type_length = *header.get(1)?;
        let payload_length = *header.get(2)?;
        if type_length > NDEF_MAX_TYPE_LENGTH || payload_length == 0 || payload_length >= NDEF_MAX_PAYLOAD_LENGTH {
            return None;
        }
        let id_length = if flags & FLAG_IL != 0 { *header.get(3)? } else { 0 };

        let header_size = if flags & FLAG_IL != 0 { 4 } else { 3 };
        let total_size = header_size + type_length as u32 + id_length as u32 + payload_length as u32;
        Some(Self {
            offset,
            flags,
            type_length,
            payload_length,
            id_length,
            total_size,
        })
    }

    pub fn tnf(&self) -> u8 {
        self.flags & TNF_MASK
    }

    fn header_size(&self) -> usize {
        if self.flags & FLAG_IL != 0 {
            4
        } else {
            3
        }
    }

    /// Type field, relative to the record start.
    pub fn type_range(&self) -> Range<usize> {
        let start = self.header_size();
        start..start + self.type_length as usize
    }

    /// Payload field, relative to the record start.
    pub fn payload_range(&self) -> Range<usize> {
        let start = self.type_range().end + self.id_length as usize;
        start..start + self.payload_length as usize
    }

    /// Bytes past the record start needed to hold the whole record.
    pub fn end(&self) -> usize {
        self.offset + self.total_size as usize
    }

    /// The record out of `bytes`, cut short if `bytes` ends early.
    pub fn slice<'b>(&self, bytes: &'b [u8]) -> &'b [u8] {
        let start = self.offset.min(bytes.len());
        &bytes[start..self.end().min(bytes.len())]
    }
}

/// First offset where a plausible short record header begins.
pub fn find_direct_record(payload: &[u8]) -> Option<RecordCandidate> {
    (0..payload.len()).find_map(|offset| RecordCandidate::at(payload, offset))
}

/// Every `03 LL` sub-TLV in `payload`, in order, each cut to the bytes present.
pub fn inner_tlv_parts(payload: &[u8]) -> Vec<&[u8]> {
    let mut parts = Vec::new();
    let mut i = 0;
    while i + 2 < payload.len() {
        let length = payload[i + 1];
        if payload[i] == NDEF_TLV_TAG && length != 0 && length != 0xFF {
            let start = i + 2;
            let end = (start + length as usize).min(payload.len());
            parts.push(&payload[start..end]);
            i = end;
        } else {
            i += 1;
        }
    }
    parts
}

/// Rebuild a message spread over consecutive sub-TLVs.
///
/// The first part decides how big the message is; later parts are appended in
/// order until that size is reached or the parts run out.
pub fn scan_inner_tlv(payload: &[u8]) -> Option<Vec<u8>> {
    let parts = inner_tlv_parts(payload);
    let (first, rest) = parts.split_first()?;
    let mut message = first.to_vec();

    if let Some(record) = RecordCandidate::at(first, 0) {
        let declared = record.total_size as usize;
        for part in rest {
            if message.len() >= declared {
                break;
            }
            message.extend_from_slice(part);
        }
        message.truncate(declared);
        debug!(
            "NDEF: inner TLV message of {} bytes from {} parts (declared {declared})",
            message.len(),
            parts.len()
        );
    }
    Some(message)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanStrategy {
    DirectRecord,
    InnerTlv,
}

pub const DEFAULT_STRATEGIES: [ScanStrategy; 2] = [ScanStrategy::DirectRecord, ScanStrategy::InnerTlv];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconstruction {
    /// A record header inside the payload; the record may extend past it.
    Record(RecordCandidate),
    /// A message stitched from sub-TLVs.
    InnerTlv(Vec<u8>),
}

impl ScanStrategy {
    pub fn scan(self, payload: &[u8]) -> Option<Reconstruction> {
        match self {
            ScanStrategy::DirectRecord => find_direct_record(payload).map(Reconstruction::Record),
            ScanStrategy::InnerTlv => scan_inner_tlv(payload).map(Reconstruction::InnerTlv),
        }
    }
}

/// Run `strategies` in order, the first hit wins.
pub fn scan_payload(payload: &[u8], strategies: &[ScanStrategy]) -> Option<(ScanStrategy, Reconstruction)> {
    strategies
        .iter()
        .find_map(|strategy| strategy.scan(payload).map(|found| (*strategy, found)))
}

/// Best reconstruction possible from `payload` alone, without further reads.
pub fn reconstruct(payload: &[u8]) -> Vec<u8> {
    match scan_payload(payload, &DEFAULT_STRATEGIES) {
        Some((_, Reconstruction::Record(record))) => record.slice(payload).to_vec(),
        Some((_, Reconstruction::InnerTlv(bytes))) => bytes,
        None => payload.to_vec(),
    }
}

/// The text carried by a record, or `bytes` unchanged if they do not start with one.
///
/// Text records lose their status byte and language code.
pub fn record_text(bytes: &[u8]) -> &[u8] {
    let Some(record) = RecordCandidate::at(bytes, 0) else {
        return bytes;
    };
    let clamp = |r: Range<usize>| r.start.min(bytes.len())..r.end.min(bytes.len());
    let payload = &bytes[clamp(record.payload_range())];

    let is_text = record.tnf() == TNF_WELL_KNOWN && &bytes[clamp(record.type_range())] == TEXT_RECORD_TYPE;
    match payload.first() {
        Some(status) if is_text => {
            let skip = 1 + (status & TEXT_LANG_LEN_MASK) as usize;
            &payload[skip.min(payload.len())..]
        }
        _ => payload,
    }
}


// EOF
