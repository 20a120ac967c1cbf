// faketag.rs — Scripted in-memory Type 2 tag for unit tests

use crate::*;

pub struct FakeTag {
    /// Tag memory image starting at page 0.
    pub memory: Vec<u8>,
    /// Any exchange touching this page or later fails.
    pub fail_from_page: Option<u8>,
    /// Indexes (counting from 0) of exchanges that fail.
    pub fail_exchanges: Vec<usize>,
    pub exchanges: Vec<(u8, u16)>,
}

impl FakeTag {
    pub fn with_data(memory: &[u8]) -> Self {
        Self {
            memory: memory.to_vec(),
            fail_from_page: None,
            fail_exchanges: Vec::new(),
            exchanges: Vec::new(),
        }
    }

    /// Pages 0..2 zeroed, page 3 a capability container advertising
    /// `capacity` bytes, then `data` from page 4 padded with zeroes.
    pub fn ultralight(capacity: usize, data: &[u8]) -> Self {
        let mut memory = vec![0u8; 12];
        memory.extend_from_slice(&[0xE1, 0x10, (capacity / 8) as u8, 0x00]);
        memory.extend_from_slice(data);
        memory.resize(16 + capacity.max(data.len()), 0);
        Self::with_data(&memory)
    }

    /// A tag holding `tlv` from page 4 whose memory ends right after it.
    pub fn ultralight_exact(tlv: &[u8]) -> Self {
        let mut tag = Self::ultralight(0, tlv);
        tag.memory.resize(16 + tlv.len().div_ceil(4) * 4, 0);
        tag
    }
}

impl PageTransport for FakeTag {
    fn read_pages(&mut self, start_page: u8, byte_count: u16) -> AppResult<Vec<u8>> {
        let index = self.exchanges.len();
        self.exchanges.push((start_page, byte_count));
        let pages = (byte_count as usize).div_ceil(ULTRALIGHT_PAGE_SIZE);
        let last = start_page as usize + pages.max(1) - 1;

        let failed =
            self.fail_exchanges.contains(&index) || self.fail_from_page.is_some_and(|p| last >= p as usize);
        let start = start_page as usize * ULTRALIGHT_PAGE_SIZE;
        if failed || start >= self.memory.len() {
            return Err(AppError::Transport {
                page: start_page,
                reason: "NAK".into(),
            });
        }

        let end = (start + ULTRALIGHT_PAGES_PER_READ as usize * ULTRALIGHT_PAGE_SIZE).min(self.memory.len());
        Ok(self.memory[start..end].to_vec())
    }
}

// EOF
