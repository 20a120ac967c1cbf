// assembler.rs — Growing the tag buffer until the NDEF message is complete, or as complete as it gets

use crate::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledMessage {
    pub descriptor: TlvDescriptor,
    /// Message bytes between the TLV header and the declared end,
    /// shortened if the tag could not deliver that many.
    pub payload: Vec<u8>,
    /// Result of the record scan, `payload` itself if no strategy matched.
    pub reconstructed: Vec<u8>,
    pub strategy: Option<ScanStrategy>,
    pub warnings: Vec<DecodeWarning>,
}

impl AssembledMessage {
    /// Text handed to the report decoder.
    pub fn text(&self) -> &[u8] {
        record_text(&self.reconstructed)
    }
}

pub struct MessageAssembler<'a> {
    policy: &'a ReadPolicy,
    strategies: &'a [ScanStrategy],
}

impl<'a> MessageAssembler<'a> {
    pub fn new(policy: &'a ReadPolicy) -> Self {
        Self {
            policy,
            strategies: &DEFAULT_STRATEGIES,
        }
    }

    pub fn with_strategies(policy: &'a ReadPolicy, strategies: &'a [ScanStrategy]) -> Self {
        Self { policy, strategies }
    }

    /// Read the message described by `descriptor` out of the tag.
    ///
    /// Fails only if the tag cannot even supply the bytes in front of the
    /// payload. A message shorter than declared is kept as it is, with a
    /// `DecodeWarning::Truncated`.
    pub fn assemble<T: PageTransport>(
        &self,
        reader: &mut PageReader<'_, T>,
        descriptor: TlvDescriptor,
    ) -> AppResult<AssembledMessage> {
        let mut warnings = Vec::new();
        let window_origin =
            (ULTRALIGHT_DATA_START_PAGE as usize).saturating_sub(reader.buffer().origin_page() as usize) * ULTRALIGHT_PAGE_SIZE;
        let start = window_origin + descriptor.payload_start_offset as usize;
        let declared = descriptor.message_length as usize;

        let remaining = (start + declared).saturating_sub(reader.buffer().len());
        let target = remaining.max(self.policy.read_floor as usize);
        debug!(
            "NDEF: message at {start}, {declared} bytes declared, {} buffered, reading {target} more",
            reader.buffer().len()
        );
        if target > 0 {
            let got = self.fill(reader, target);
            debug!("NDEF: buffer now {} bytes (+{got})", reader.buffer().len());
        }

        let available = reader.buffer().len();
        if available < start {
            return Err(AppError::format(format!(
                "only {available} bytes read, message starts at {start}"
            )));
        }
        let mut length = declared;
        if available < start + declared {
            length = available - start;
            let warning = DecodeWarning::Truncated {
                declared,
                available: length,
            };
            warn!("NDEF: {warning}");
            warnings.push(warning);
        }

        let payload = reader.buffer().as_slice()[start..start + length].to_vec();
        debug!("NDEF: payload {}", format_bytes(&payload));

        let (strategy, reconstructed) = match scan_payload(&payload, self.strategies) {
            Some((strategy, Reconstruction::Record(record))) => {
                let bytes = self.complete_record(reader, start, record, &mut warnings);
                (Some(strategy), bytes)
            }
            Some((strategy, Reconstruction::InnerTlv(bytes))) => (Some(strategy), bytes),
            None => {
                debug!("NDEF: no record structure found, using payload as is");
                (None, payload.clone())
            }
        };
        if let Some(strategy) = strategy {
            info!("NDEF: {} bytes recovered via {strategy:?}", reconstructed.len());
        }

        Ok(AssembledMessage {
            descriptor,
            payload,
            reconstructed,
            strategy,
            warnings,
        })
    }

    /// Bulk read of `target` bytes, falling back to the policy's chunk sizes.
    /// Returns how many bytes were added.
    fn fill<T: PageTransport>(&self, reader: &mut PageReader<'_, T>, target: usize) -> usize {
        let target = target.min(u16::MAX as usize);
        match reader.read_more(target as u16) {
            Ok(n) => return n,
            Err(e) => warn!("NDEF: bulk read of {target} bytes failed: {e}"),
        }

        let mut got = 0;
        for &chunk in &self.policy.chunk_sizes {
            while got < target {
                let want = (chunk as usize).min(target - got) as u16;
                match reader.read_more(want) {
                    Ok(0) => return got,
                    Ok(n) => got += n,
                    Err(e) => {
                        debug!("NDEF: {chunk} byte chunks stopped at {got} bytes: {e}");
                        break;
                    }
                }
            }
        }
        if got == 0 {
            warn!("NDEF: no data beyond {} bytes", reader.buffer().len());
        }
        got
    }

    /// The record found at `record.offset` into the payload, read further if
    /// its header points past the buffer.
    fn complete_record<T: PageTransport>(
        &self,
        reader: &mut PageReader<'_, T>,
        payload_start: usize,
        record: RecordCandidate,
        warnings: &mut Vec<DecodeWarning>,
    ) -> Vec<u8> {
        let record_start = payload_start + record.offset;
        let needed = record_start + record.total_size as usize;

        let buffered = reader.buffer().len();
        if buffered < needed {
            let gap = needed - buffered + self.policy.gap_margin as usize;
            debug!("NDEF: record needs {} more bytes, reading {gap}", needed - buffered);
            if let Err(e) = reader.read_more(gap.min(u16::MAX as usize) as u16) {
                debug!("NDEF: gap read with margin failed: {e}");
                let got = self.fill(reader, needed - buffered);
                if got == 0 {
                    warn!("NDEF: could not complete record: {e}");
                }
            }
        }

        let buffer = reader.buffer().as_slice();
        let bytes = buffer[record_start..needed.min(buffer.len())].to_vec();
        if bytes.len() < record.total_size as usize {
            let warning = DecodeWarning::ShortRecord {
                wanted: record.total_size as usize,
                got: bytes.len(),
            };
            warn!("NDEF: {warning}");
            warnings.push(warning);
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faketag::FakeTag;

    fn text_record(text: &str) -> Vec<u8> {
        let mut r = vec![0xD1, 0x01, (text.len() + 3) as u8, b'T', 0x02, b'e', b'n'];
        r.extend_from_slice(text.as_bytes());
        r
    }

    fn tlv(record: &[u8]) -> Vec<u8> {
        let mut t = vec![0x03, record.len() as u8];
        t.extend_from_slice(record);
        t.push(0xFE);
        t
    }

    fn run(tag: &mut FakeTag, policy: &ReadPolicy) -> AppResult<AssembledMessage> {
        let mut reader = PageReader::new(tag, ULTRALIGHT_CC_PAGE);
        reader.read_pages(ULTRALIGHT_CC_PAGE, 16)?;
        let descriptor = locate_ndef_tlv(&reader.buffer().as_slice()[4..])?;
        MessageAssembler::new(policy).assemble(&mut reader, descriptor)
    }

    #[test]
    fn complete_message() {
        let record = text_record("Meter\r\nVol: 1.000 m³\r\n");
        let mut tag = FakeTag::ultralight(144, &tlv(&record));
        let msg = run(&mut tag, &ReadPolicy::default()).unwrap();

        assert_eq!(msg.payload, record);
        assert_eq!(msg.reconstructed, record);
        assert_eq!(msg.strategy, Some(ScanStrategy::DirectRecord));
        assert_eq!(msg.text(), "Meter\r\nVol: 1.000 m³\r\n".as_bytes());
        assert!(msg.warnings.is_empty());
    }

    #[test]
    fn short_tag_truncates_instead_of_failing() {
        // TLV claims 120 bytes, the tag ends after 40
        let mut data = vec![0x03, 120];
        data.extend_from_slice(b"Meter\r\nS/N: 1\r\nVol: 7 m3\r\nTemp: 12\r\nxxxxx");
        let mut tag = FakeTag::ultralight_exact(&data);
        let msg = run(&mut tag, &ReadPolicy::default()).unwrap();

        assert_eq!(msg.payload.len(), tag.memory.len() - 16 - 2);
        assert!(msg.payload.starts_with(b"Meter\r\n"));
        assert_eq!(
            msg.warnings,
            vec![DecodeWarning::Truncated {
                declared: 120,
                available: msg.payload.len()
            }]
        );
        assert_eq!(msg.strategy, None);
    }

    #[test]
    fn record_longer_than_tlv_is_read_from_floor_bytes() {
        let record = text_record("Meter\r\nVol: 123.456 m³\r\nBattery: 87%\r\n");
        let mut data = vec![0x03, 10];
        data.extend_from_slice(&record);
        let mut tag = FakeTag::ultralight(144, &data);
        let msg = run(&mut tag, &ReadPolicy::default()).unwrap();

        assert_eq!(msg.payload.len(), 10);
        assert_eq!(msg.reconstructed, record);
        assert!(msg.warnings.is_empty());
    }

    #[test]
    fn record_gap_triggers_one_more_read() {
        let record = text_record("Meter\r\nVol: 123.456 m³\r\nBattery: 87%\r\nTemp: 10\r\n");
        let mut data = vec![0x03, 10];
        data.extend_from_slice(&record);
        let mut tag = FakeTag::ultralight(200, &data);
        let policy = ReadPolicy {
            read_floor: 0,
            ..Default::default()
        };
        let msg = run(&mut tag, &policy).unwrap();

        assert_eq!(msg.reconstructed, record);
        // window read, then the gap read
        assert_eq!(tag.exchanges.first(), Some(&(3, 16)));
        assert!(tag.exchanges.iter().skip(1).all(|(page, _)| *page >= 7));
    }

    #[test]
    fn gap_margin_past_tag_end_still_completes_record() {
        // 50 byte record, TLV only claims its first 10 bytes, no capacity in the CC
        let record = text_record(&"x".repeat(43));
        assert_eq!(record.len(), 50);
        let mut data = vec![0x03, 0x0A];
        data.extend_from_slice(&record);
        let mut tag = FakeTag::ultralight_exact(&data);
        let policy = ReadPolicy {
            read_floor: 0,
            ..Default::default()
        };
        let msg = run(&mut tag, &policy).unwrap();

        assert_eq!(msg.reconstructed, record);
        assert!(msg.warnings.iter().all(|w| !matches!(w, DecodeWarning::ShortRecord { .. })));
    }

    #[test]
    fn record_cut_by_tag_end_is_kept() {
        let record = text_record("Meter\r\nVol: 123.456 m³\r\nBattery: 87%\r\nTemp: 10\r\n");
        let mut data = vec![0x03, record.len() as u8];
        data.extend_from_slice(&record[..30]);
        let mut tag = FakeTag::ultralight_exact(&data);
        let msg = run(&mut tag, &ReadPolicy::default()).unwrap();

        assert!(msg.reconstructed.starts_with(&record[..30]));
        assert!(msg
            .warnings
            .iter()
            .any(|w| matches!(w, DecodeWarning::ShortRecord { wanted, .. } if *wanted == record.len())));
    }

    #[test]
    fn failed_bulk_read_falls_back_to_chunks() {
        let record = text_record("Meter\r\nVol: 5.5 m³\r\n");
        let mut tag = FakeTag::ultralight(96, &tlv(&record));
        // exchange 0 is the window, 1 opens the bulk read, 2 the first 64 byte chunk
        tag.fail_exchanges = vec![1, 2];
        let mut reader = PageReader::new(&mut tag, ULTRALIGHT_CC_PAGE);
        reader.read_pages(ULTRALIGHT_CC_PAGE, 16).unwrap();
        reader.limit_to_page(3 + 96 / 4);
        let descriptor = locate_ndef_tlv(&reader.buffer().as_slice()[4..]).unwrap();

        let msg = MessageAssembler::new(&ReadPolicy::default())
            .assemble(&mut reader, descriptor)
            .unwrap();
        assert_eq!(reader.buffer().len(), 16 + 84);
        assert_eq!(msg.reconstructed, record);
        assert!(msg.warnings.is_empty());
    }

    #[test]
    fn nothing_past_the_window_still_yields_a_payload() {
        let mut data = vec![0x03, 60];
        data.extend_from_slice(b"Meter\r\nS/N");
        let mut tag = FakeTag::ultralight_exact(&data);
        tag.fail_from_page = Some(7);
        let msg = run(&mut tag, &ReadPolicy::default()).unwrap();

        assert_eq!(msg.payload, b"Meter\r\nS/N");
        assert_eq!(msg.warnings.len(), 1);
    }

    #[test]
    fn missing_header_bytes_are_a_format_error() {
        let mut tag = FakeTag::ultralight_exact(&[0x03, 0x05, b'a', b'b', b'c', b'd', b'e']);
        let mut reader = PageReader::new(&mut tag, ULTRALIGHT_CC_PAGE);
        reader.read_pages(ULTRALIGHT_CC_PAGE, 12).unwrap();
        let descriptor = TlvDescriptor {
            message_length: 5,
            payload_start_offset: 40,
            kind: TlvKind::Fixed,
        };
        let err = MessageAssembler::new(&ReadPolicy::default())
            .assemble(&mut reader, descriptor)
            .unwrap_err();
        assert!(matches!(err, AppError::Format(_)));
    }

    #[test]
    fn inner_tlv_fallback_rebuilds_split_record() {
        let record = text_record("Meter\r\nVol: 9 m³\r\n");
        let mut inner = vec![0x00, 0x03, 12];
        inner.extend_from_slice(&record[..12]);
        inner.extend_from_slice(&[0x03, (record.len() - 12) as u8]);
        inner.extend_from_slice(&record[12..]);
        let mut tag = FakeTag::ultralight(96, &tlv(&inner));
        let strategies = [ScanStrategy::InnerTlv];

        let mut reader = PageReader::new(&mut tag, ULTRALIGHT_CC_PAGE);
        reader.read_pages(ULTRALIGHT_CC_PAGE, 16).unwrap();
        let descriptor = locate_ndef_tlv(&reader.buffer().as_slice()[4..]).unwrap();
        let msg = MessageAssembler::with_strategies(&ReadPolicy::default(), &strategies)
            .assemble(&mut reader, descriptor)
            .unwrap();

        assert_eq!(msg.strategy, Some(ScanStrategy::InnerTlv));
        assert_eq!(msg.reconstructed, record);
        assert_eq!(msg.text(), "Meter\r\nVol: 9 m³\r\n".as_bytes());
    }
}

// EOF
