// pagereader.rs — Bounded, all-or-nothing page reads into a growing tag buffer

use crate::*;

/// Raw page access provided by the reader hardware.
///
/// A call reads `byte_count` bytes starting at `start_page`. The caller always
/// asks for whole pages and never more than one exchange worth of them
/// (`ULTRALIGHT_PAGES_PER_READ`). Implementations may return more bytes than
/// requested (a MIFARE READ always yields four pages); extra bytes are dropped.
pub trait PageTransport {
    fn read_pages(&mut self, start_page: u8, byte_count: u16) -> AppResult<Vec<u8>>;
}

impl<T: PageTransport + ?Sized> PageTransport for &mut T {
    fn read_pages(&mut self, start_page: u8, byte_count: u16) -> AppResult<Vec<u8>> {
        (**self).read_pages(start_page, byte_count)
    }
}

/// Everything read from one tag so far, starting at `origin_page`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagBuffer {
    origin_page: u8,
    bytes: Vec<u8>,
}

impl TagBuffer {
    pub fn new(origin_page: u8) -> Self {
        Self {
            origin_page,
            bytes: Vec::new(),
        }
    }

    pub fn origin_page(&self) -> u8 {
        self.origin_page
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// First page not yet buffered. Can exceed `u8` once the buffer reaches the tag end.
    pub fn next_page(&self) -> usize {
        self.origin_page as usize + self.bytes.len().div_ceil(ULTRALIGHT_PAGE_SIZE)
    }

    fn append(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }
}

pub struct PageReader<'a, T: PageTransport> {
    transport: &'a mut T,
    buffer: TagBuffer,
    last_page: u8,
}

impl<'a, T: PageTransport> PageReader<'a, T> {
    pub fn new(transport: &'a mut T, origin_page: u8) -> Self {
        Self {
            transport,
            buffer: TagBuffer::new(origin_page),
            last_page: ULTRALIGHT_MAX_PAGE,
        }
    }

    pub fn buffer(&self) -> &TagBuffer {
        &self.buffer
    }

    /// Pages past `page` are never requested from the tag.
    pub fn limit_to_page(&mut self, page: u8) {
        self.last_page = page.max(self.buffer.origin_page());
    }

    /// Read `byte_count` bytes (rounded up to whole pages) starting at
    /// `start_page`, which must be the next unbuffered page.
    ///
    /// The buffer is only extended if every exchange succeeds. Returns the
    /// number of bytes appended, which is zero once the tag end is reached.
    pub fn read_pages(&mut self, start_page: u8, byte_count: u16) -> AppResult<usize> {
        if start_page as usize != self.buffer.next_page() {
            return Err(AppError::Message(format!(
                "non-contiguous read at page {start_page}, next page is {}",
                self.buffer.next_page()
            )));
        }
        if start_page > self.last_page || byte_count == 0 {
            return Ok(0);
        }

        let wanted_pages = (byte_count as usize).div_ceil(ULTRALIGHT_PAGE_SIZE);
        let available_pages = (self.last_page - start_page) as usize + 1;
        let pages = wanted_pages.min(available_pages);

        let mut data = Vec::with_capacity(pages * ULTRALIGHT_PAGE_SIZE);
        let mut page = start_page as usize;
        let end_page = start_page as usize + pages;
        while page < end_page {
            let group = (end_page - page).min(ULTRALIGHT_PAGES_PER_READ as usize);
            let group_bytes = group * ULTRALIGHT_PAGE_SIZE;
            let response = self.transport.read_pages(page as u8, group_bytes as u16)?;
            if response.len() < group_bytes {
                return Err(AppError::Transport {
                    page: page as u8,
                    reason: format!("short response, {} of {group_bytes} bytes", response.len()),
                });
            }
            data.extend_from_slice(&response[..group_bytes]);
            page += group;
        }

        debug!("NFC: read {} bytes from page {start_page}", data.len());
        self.buffer.append(&data);
        Ok(data.len())
    }

    /// Continue reading right after the buffered bytes.
    pub fn read_more(&mut self, byte_count: u16) -> AppResult<usize> {
        let next = self.buffer.next_page();
        if next > self.last_page as usize {
            return Ok(0);
        }
        self.read_pages(next as u8, byte_count)
    }
}


// EOF
