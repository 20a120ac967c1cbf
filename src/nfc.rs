// nfc.rs — Tag memory layout and tag identity helpers

use std::fmt::Write;

use crate::*;

pub const ULTRALIGHT_PAGE_SIZE: usize = 4;
/// A MIFARE READ returns four consecutive pages.
pub const ULTRALIGHT_PAGES_PER_READ: u8 = 4;
pub const ULTRALIGHT_CC_PAGE: u8 = 3;
pub const ULTRALIGHT_DATA_START_PAGE: u8 = 4;
pub const ULTRALIGHT_MAX_PAGE: u8 = 255;

pub const MIFARE_CMD_READ: u8 = 0x30;

pub const NDEF_TLV_TAG: u8 = 0x03;

pub const MIFARE_CLASSIC: &str = "Mifare Classic";
pub const NFC_FORUM_TYPE_2: &str = "NFC Forum Type 2";
pub const TAG_TYPE_UNKNOWN: &str = "Unknown";

pub const MAX_UID_LEN: usize = 10;
pub type Uid = heapless::Vec<u8, MAX_UID_LEN>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagType {
    MifareClassic,
    Type2,
    Unknown,
}

impl TagType {
    pub fn name(self) -> &'static str {
        match self {
            TagType::MifareClassic => MIFARE_CLASSIC,
            TagType::Type2 => NFC_FORUM_TYPE_2,
            TagType::Unknown => TAG_TYPE_UNKNOWN,
        }
    }
}

/// ISO14443A UID length is the only hint the reader gets about the tag family.
pub fn guess_tag_type(uid_len: usize) -> TagType {
    match uid_len {
        4 => TagType::MifareClassic,
        7 => TagType::Type2,
        _ => TagType::Unknown,
    }
}

pub fn uid_from_slice(bytes: &[u8]) -> AppResult<Uid> {
    let mut uid = Uid::new();
    uid.extend_from_slice(bytes)
        .map_err(|_| AppError::Unsupported(format!("UID of {} bytes", bytes.len())))?;
    Ok(uid)
}

pub fn format_uid(uid: &[u8]) -> String {
    let mut s = String::with_capacity(uid.len() * 3);
    for (i, b) in uid.iter().enumerate() {
        if i > 0 {
            s.push('-');
        }
        let _ = write!(s, "{b:02X}");
    }
    s
}

pub fn format_bytes(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{b:02X}");
    }
    s
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NfcTag {
    pub uid: Uid,
    pub tag_type: TagType,
}

impl NfcTag {
    pub fn new(uid: &[u8]) -> AppResult<Self> {
        Ok(Self {
            uid: uid_from_slice(uid)?,
            tag_type: guess_tag_type(uid.len()),
        })
    }

    pub fn tag_type_name(&self) -> &'static str {
        self.tag_type.name()
    }

    pub fn uid_string(&self) -> String {
        format_uid(&self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_is_dash_separated_hex() {
        assert_eq!(format_uid(&[0x04, 0xA1, 0x0B]), "04-A1-0B");
        assert_eq!(format_uid(&[]), "");
        assert_eq!(format_bytes(&[0x03, 0xFF, 0x00]), "03 FF 00");
    }

    #[test]
    fn tag_type_follows_uid_length() {
        let tag = NfcTag::new(&[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]).unwrap();
        assert_eq!(tag.tag_type, TagType::Type2);
        assert_eq!(tag.tag_type_name(), "NFC Forum Type 2");
        assert_eq!(guess_tag_type(4), TagType::MifareClassic);
        assert_eq!(guess_tag_type(10).name(), "Unknown");
    }

    #[test]
    fn oversized_uid_is_refused() {
        assert!(matches!(NfcTag::new(&[0u8; 11]), Err(AppError::Unsupported(_))));
    }
}

// EOF
