// pn532.rs — PN532 NFC reader over SPI

use embedded_hal::{
    delay::DelayNs,
    spi::{Operation, SpiDevice},
};

use crate::*;

// SPI direction bytes, sent before every transfer
const SPI_DATAWRITE: u8 = 0x01;
const SPI_STATREAD: u8 = 0x02;
const SPI_DATAREAD: u8 = 0x03;
const SPI_READY: u8 = 0x01;

const PREAMBLE: [u8; 3] = [0x00, 0x00, 0xFF];
const POSTAMBLE: u8 = 0x00;
const ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];
const HOST_TO_PN532: u8 = 0xD4;
const PN532_TO_HOST: u8 = 0xD5;

pub const CMD_GET_FIRMWARE_VERSION: u8 = 0x02;
pub const CMD_SAM_CONFIGURATION: u8 = 0x14;
pub const CMD_RF_CONFIGURATION: u8 = 0x32;
pub const CMD_IN_DATA_EXCHANGE: u8 = 0x40;
pub const CMD_IN_LIST_PASSIVE_TARGET: u8 = 0x4A;

const PN532_IC: u8 = 0x32;
// 106 kbps type A
const BRTY_ISO14443A: u8 = 0x00;
// SAM normal mode, 1 s virtual card timeout, use IRQ
const SAM_NORMAL: [u8; 3] = [0x01, 0x14, 0x01];
// CfgItem 5: MxRtyATR, MxRtyPSL, MxRtyPassiveActivation
const RF_MAX_RETRIES: [u8; 4] = [0x05, 0xFF, 0x01, 0x02];

const RESPONSE_BUF_SIZE: usize = 64;
const MAX_FRAME_DATA: usize = 252;

const ACK_TIMEOUT_MS: u32 = 10;
const DEFAULT_TIMEOUT_MS: u32 = 100;
const POLL_TIMEOUT_MS: u32 = 300;

#[derive(Debug, thiserror::Error)]
pub enum Pn532Error<E> {
    #[error("SPI error: {0:?}")]
    Spi(E),
    #[error("no ACK for command {0:#04X}")]
    NoAck(u8),
    #[error("timeout waiting for response to {0:#04X}")]
    Timeout(u8),
    #[error("bad frame: {0}")]
    Frame(&'static str),
    #[error("response {got:#04X} does not answer command {cmd:#04X}")]
    Mismatch { cmd: u8, got: u8 },
    #[error("command {cmd:#04X} failed with status {status:#04X}")]
    Status { cmd: u8, status: u8 },
    #[error("unexpected chip {0:#04X}")]
    Chip(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub ic: u8,
    pub version: u8,
    pub revision: u8,
    pub support: u8,
}

/// Normal information frame carrying `cmd` and `data` to the PN532.
pub fn build_frame<E>(cmd: u8, data: &[u8]) -> Result<Vec<u8>, Pn532Error<E>> {
    if data.len() > MAX_FRAME_DATA {
        return Err(Pn532Error::Frame("command data too long"));
    }
    let len = (data.len() + 2) as u8;

    let mut frame = Vec::with_capacity(data.len() + 9);
    frame.extend_from_slice(&PREAMBLE);
    frame.push(len);
    frame.push(len.wrapping_neg());
    frame.push(HOST_TO_PN532);
    frame.push(cmd);
    frame.extend_from_slice(data);
    let sum = frame[5..].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    frame.push(sum.wrapping_neg());
    frame.push(POSTAMBLE);
    Ok(frame)
}

/// Response data to `cmd` out of `raw`, with both checksums verified.
///
/// Bytes before the start code and after the data checksum are ignored.
pub fn parse_response<E>(cmd: u8, raw: &[u8]) -> Result<Vec<u8>, Pn532Error<E>> {
    let start = raw
        .windows(2)
        .position(|w| w == [0x00, 0xFF])
        .ok_or(Pn532Error::Frame("no start code"))?;
    let frame = &raw[start + 2..];

    let (&len, &lcs) = match frame {
        [len, lcs, ..] => (len, lcs),
        _ => return Err(Pn532Error::Frame("no length")),
    };
    // ACK and NACK frames carry no data and no valid length checksum
    if len < 2 {
        return Err(Pn532Error::Frame("empty frame"));
    }
    if len.wrapping_add(lcs) != 0 {
        return Err(Pn532Error::Frame("length checksum"));
    }

    let body = frame
        .get(2..2 + len as usize)
        .ok_or(Pn532Error::Frame("frame cut short"))?;
    let dcs = *frame.get(2 + len as usize).ok_or(Pn532Error::Frame("no data checksum"))?;
    if body.iter().fold(dcs, |acc, b| acc.wrapping_add(*b)) != 0 {
        return Err(Pn532Error::Frame("data checksum"));
    }

    if body[0] != PN532_TO_HOST {
        return Err(Pn532Error::Frame("not a PN532 response"));
    }
    if body[1] != cmd.wrapping_add(1) {
        return Err(Pn532Error::Mismatch { cmd, got: body[1] });
    }
    Ok(body[2..].to_vec())
}

pub struct Pn532<SPI, D> {
    spi: SPI,
    delay: D,
}

impl<SPI, D> Pn532<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    pub fn new(spi: SPI, delay: D) -> Self {
        Self { spi, delay }
    }

    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    fn wait_ready(&mut self, timeout_ms: u32) -> Result<bool, Pn532Error<SPI::Error>> {
        for _ in 0..=timeout_ms {
            let mut status = [0u8];
            self.spi
                .transaction(&mut [Operation::Write(&[SPI_STATREAD]), Operation::Read(&mut status)])
                .map_err(Pn532Error::Spi)?;
            if status[0] & SPI_READY != 0 {
                return Ok(true);
            }
            self.delay.delay_ms(1);
        }
        Ok(false)
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<(), Pn532Error<SPI::Error>> {
        self.spi
            .transaction(&mut [Operation::Write(&[SPI_DATAREAD]), Operation::Read(buf)])
            .map_err(Pn532Error::Spi)
    }

    fn write_command(&mut self, cmd: u8, data: &[u8]) -> Result<(), Pn532Error<SPI::Error>> {
        let mut out = vec![SPI_DATAWRITE];
        out.extend(build_frame::<SPI::Error>(cmd, data)?);
        trace!("PN532: > {}", format_bytes(&out[1..]));
        self.spi.write(&out).map_err(Pn532Error::Spi)?;

        if !self.wait_ready(ACK_TIMEOUT_MS)? {
            return Err(Pn532Error::NoAck(cmd));
        }
        let mut ack = [0u8; ACK_FRAME.len()];
        self.read_raw(&mut ack)?;
        if ack != ACK_FRAME {
            debug!("PN532: bad ACK {}", format_bytes(&ack));
            return Err(Pn532Error::NoAck(cmd));
        }
        Ok(())
    }

    fn read_response(&mut self, cmd: u8, timeout_ms: u32) -> Result<Vec<u8>, Pn532Error<SPI::Error>> {
        if !self.wait_ready(timeout_ms)? {
            return Err(Pn532Error::Timeout(cmd));
        }
        let mut buf = [0u8; RESPONSE_BUF_SIZE];
        self.read_raw(&mut buf)?;
        trace!("PN532: < {}", format_bytes(&buf));
        parse_response(cmd, &buf)
    }

    /// Send `cmd` and wait up to `timeout_ms` for its response data.
    pub fn command(&mut self, cmd: u8, data: &[u8], timeout_ms: u32) -> Result<Vec<u8>, Pn532Error<SPI::Error>> {
        self.write_command(cmd, data)?;
        self.read_response(cmd, timeout_ms)
    }

    pub fn firmware_version(&mut self) -> Result<FirmwareVersion, Pn532Error<SPI::Error>> {
        let resp = self.command(CMD_GET_FIRMWARE_VERSION, &[], DEFAULT_TIMEOUT_MS)?;
        match resp[..] {
            [ic, version, revision, support, ..] if ic == PN532_IC => Ok(FirmwareVersion {
                ic,
                version,
                revision,
                support,
            }),
            [ic, ..] => Err(Pn532Error::Chip(ic)),
            _ => Err(Pn532Error::Frame("short firmware version")),
        }
    }

    /// Wake the chip, check it is a PN532 and set it up for passive polling.
    pub fn init(&mut self) -> Result<FirmwareVersion, Pn532Error<SPI::Error>> {
        // a dummy status read wakes the chip from power down
        let _ = self.wait_ready(0);
        self.delay.delay_ms(2);

        let fw = self.firmware_version()?;
        info!(
            "PN532: firmware {}.{} (IC {:#04X}, support {:#04X})",
            fw.version, fw.revision, fw.ic, fw.support
        );
        self.command(CMD_SAM_CONFIGURATION, &SAM_NORMAL, DEFAULT_TIMEOUT_MS)?;
        self.command(CMD_RF_CONFIGURATION, &RF_MAX_RETRIES, DEFAULT_TIMEOUT_MS)?;
        Ok(fw)
    }

    /// UID of one ISO14443A target in the field, if any.
    pub fn poll_tag(&mut self) -> Result<Option<Uid>, Pn532Error<SPI::Error>> {
        let resp = match self.command(CMD_IN_LIST_PASSIVE_TARGET, &[0x01, BRTY_ISO14443A], POLL_TIMEOUT_MS) {
            Err(Pn532Error::Timeout(_)) => return Ok(None),
            r => r?,
        };
        // NbTg, Tg, SENS_RES(2), SEL_RES, NFCIDLength, NFCID..
        let Some(&targets) = resp.first() else {
            return Err(Pn532Error::Frame("empty target list"));
        };
        if targets == 0 {
            return Ok(None);
        }
        let uid_len = *resp.get(5).ok_or(Pn532Error::Frame("no UID length"))? as usize;
        let uid = resp.get(6..6 + uid_len).ok_or(Pn532Error::Frame("UID cut short"))?;
        let mut out = Uid::new();
        out.extend_from_slice(uid)
            .map_err(|_| Pn532Error::Frame("UID too long"))?;
        Ok(Some(out))
    }

    /// One MIFARE READ: four pages from `page`.
    pub fn read_four_pages(&mut self, page: u8) -> Result<Vec<u8>, Pn532Error<SPI::Error>> {
        let resp = self.command(
            CMD_IN_DATA_EXCHANGE,
            &[0x01, MIFARE_CMD_READ, page],
            DEFAULT_TIMEOUT_MS,
        )?;
        match resp.split_first() {
            Some((0x00, data)) => Ok(data.to_vec()),
            Some((status, _)) => Err(Pn532Error::Status {
                cmd: CMD_IN_DATA_EXCHANGE,
                status: *status,
            }),
            None => Err(Pn532Error::Frame("empty exchange response")),
        }
    }
}

impl<SPI, D> PageTransport for Pn532<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    fn read_pages(&mut self, start_page: u8, byte_count: u16) -> AppResult<Vec<u8>> {
        let exchange = ULTRALIGHT_PAGES_PER_READ as usize * ULTRALIGHT_PAGE_SIZE;
        let mut data = Vec::with_capacity(byte_count as usize);
        let mut page = start_page;

        while data.len() < byte_count as usize {
            let chunk = self.read_four_pages(page).map_err(|e| AppError::Transport {
                page,
                reason: e.to_string(),
            })?;
            if chunk.is_empty() {
                return Err(AppError::Transport {
                    page,
                    reason: "no data".into(),
                });
            }
            data.extend_from_slice(&chunk[..chunk.len().min(exchange)]);
            page = page.wrapping_add(ULTRALIGHT_PAGES_PER_READ);
        }
        data.truncate(byte_count as usize);
        Ok(data)
    }
}

impl<SPI, D> NfcController for Pn532<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    fn poll_tag(&mut self) -> AppResult<Option<Uid>> {
        Pn532::poll_tag(self).map_err(|e| AppError::Message(format!("PN532 poll failed: {e}")))
    }
}


// EOF
