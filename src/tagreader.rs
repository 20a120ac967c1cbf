// tagreader.rs — One tag on the reader: pages in, meter report out

use crate::*;

/// Pages 3..6: capability container plus the first 12 data bytes.
const HEADER_READ_BYTES: u16 = 16;

/// A decoded meter reading, ready to publish.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeterReport {
    pub uid: String,
    pub reading: Reading,
    pub json: String,
    /// `Vol` in m³, 3 decimals.
    pub volume_m3: Option<f32>,
    #[serde(skip)]
    pub warnings: Vec<DecodeWarning>,
    pub timestamp: DateTime<Utc>,
}

/// Last readable page for a data area of `capacity` bytes starting at page 4.
pub fn last_data_page(capacity: usize) -> Option<u8> {
    if capacity == 0 {
        return None;
    }
    let last = ULTRALIGHT_CC_PAGE as usize + capacity.div_ceil(ULTRALIGHT_PAGE_SIZE);
    Some(last.min(ULTRALIGHT_MAX_PAGE as usize) as u8)
}

/// Read and decode the meter report on the tag with `uid`.
///
/// Transport failures on the header pages, unformatted tags and a missing
/// NDEF TLV abort the read. Everything later degrades into warnings.
pub fn read_meter<T: PageTransport>(transport: &mut T, uid: &[u8], policy: &ReadPolicy) -> AppResult<MeterReport> {
    let tag = NfcTag::new(uid)?;
    let uid = tag.uid_string();
    info!("NFC: reading tag {uid} ({})", tag.tag_type_name());
    if tag.tag_type == TagType::MifareClassic {
        return Err(AppError::Unsupported(format!("{} tag {uid}", tag.tag_type_name())));
    }

    let mut reader = PageReader::new(transport, ULTRALIGHT_CC_PAGE);
    reader.read_pages(ULTRALIGHT_CC_PAGE, HEADER_READ_BYTES)?;
    let (cc, window) = reader.buffer().as_slice().split_at(ULTRALIGHT_PAGE_SIZE);
    debug!("NFC: CC {} window {}", format_bytes(cc), format_bytes(window));

    if !is_ndef_formatted(window) {
        return Err(AppError::format("not NDEF formatted"));
    }
    let capacity = tag_capacity(cc);
    let descriptor = locate_ndef_tlv(window)?;
    info!(
        "NDEF: capacity {capacity} bytes, message {} bytes at offset {} ({:?})",
        descriptor.message_length, descriptor.payload_start_offset, descriptor.kind
    );
    if let Some(last) = last_data_page(capacity) {
        reader.limit_to_page(last);
    }

    let message = MessageAssembler::new(policy).assemble(&mut reader, descriptor)?;
    let report = decode_report(message.text(), tag.tag_type_name())?;

    let json = report.reading.to_json()?;
    let mut warnings = message.warnings;
    warnings.extend(report.warnings);
    Ok(MeterReport {
        uid,
        volume_m3: report.reading.volume_numeric,
        reading: report.reading,
        json,
        warnings,
        timestamp: Utc::now(),
    })
}


// EOF
