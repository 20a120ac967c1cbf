// config.rs

use crc::{Crc, CRC_32_ISCSI};

use crate::*;

pub const NVS_BUF_SIZE: usize = 256;

pub const DEFAULT_POLL_MS: u64 = 500;
pub const DEFAULT_SPI_KHZ: u32 = 1000;
pub const DEFAULT_READ_FLOOR: u16 = 256;
pub const DEFAULT_GAP_MARGIN: u16 = 16;
pub const DEFAULT_CHUNK_SIZES: [u16; 5] = [64, 32, 16, 8, 4];

#[cfg(feature = "firmware")]
const CONFIG_NAME: &str = "cfg";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MyConfig {
    pub poll_ms: u64,
    pub spi_khz: u32,

    /// Minimum number of bytes requested after the TLV window, regardless of
    /// what the TLV length claims.
    pub read_floor: u16,
    /// Chunk sizes tried in order when the bulk read fails.
    pub chunk_sizes: Vec<u16>,
    /// Extra bytes requested when a record header points past the buffer.
    pub gap_margin: u16,
}

impl Default for MyConfig {
    fn default() -> Self {
        Self {
            poll_ms: DEFAULT_POLL_MS,
            spi_khz: DEFAULT_SPI_KHZ,

            read_floor: DEFAULT_READ_FLOOR,
            chunk_sizes: DEFAULT_CHUNK_SIZES.to_vec(),
            gap_margin: DEFAULT_GAP_MARGIN,
        }
    }
}

/// How hard the assembler tries to pull bytes off a tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadPolicy {
    pub read_floor: u16,
    pub chunk_sizes: Vec<u16>,
    pub gap_margin: u16,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        MyConfig::default().read_policy()
    }
}

impl MyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(50))
    }

    /// Zero-sized chunks are dropped and the rest sorted largest first.
    pub fn read_policy(&self) -> ReadPolicy {
        let mut chunk_sizes: Vec<u16> = self.chunk_sizes.iter().copied().filter(|c| *c > 0).collect();
        chunk_sizes.sort_unstable_by(|a, b| b.cmp(a));
        chunk_sizes.dedup();

        ReadPolicy {
            read_floor: self.read_floor,
            chunk_sizes,
            gap_margin: self.gap_margin,
        }
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        match postcard::from_bytes_crc32::<MyConfig>(b, digest) {
            Ok(c) => {
                info!("Successfully parsed config.");
                Some(c)
            }
            Err(e) => {
                error!("Cannot parse config: {e:?}");
                None
            }
        }
    }

    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        let mut buf = [0u8; NVS_BUF_SIZE];
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        let data = postcard::to_slice_crc32(self, &mut buf, digest)
            .map_err(|e| AppError::Message(format!("Cannot encode config to buffer {e:?}")))?;
        Ok(data.to_vec())
    }

    #[cfg(feature = "firmware")]
    pub fn from_nvs(nvs: &mut nvs::EspNvs<nvs::NvsDefault>) -> Option<Self> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        info!("Reading up to {sz} bytes from nvs...", sz = NVS_BUF_SIZE);
        let b = match nvs.get_raw(CONFIG_NAME, &mut nvsbuf) {
            Err(e) => {
                error!("Nvs read error {e:?}");
                return None;
            }
            Ok(Some(b)) => b,
            _ => {
                error!("Nvs key not found");
                return None;
            }
        };
        info!("Got {sz} bytes from nvs. Parsing config...", sz = b.len());
        Self::from_bytes(b)
    }

    #[cfg(feature = "firmware")]
    pub fn to_nvs(&self, nvs: &mut nvs::EspNvs<nvs::NvsDefault>) -> AppResult<()> {
        let nvsdata = self.to_bytes()?;
        info!("Encoded config to {sz} bytes. Saving to nvs...", sz = nvsdata.len());

        nvs.set_raw(CONFIG_NAME, &nvsdata)
            .map_err(|e| AppError::Message(format!("Cannot save to nvs: {e:?}")))?;
        info!("Config saved.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_survives_storage() {
        let config = MyConfig {
            poll_ms: 250,
            chunk_sizes: vec![32, 16, 8],
            ..Default::default()
        };
        let blob = config.to_bytes().unwrap();
        assert_eq!(MyConfig::from_bytes(&blob), Some(config));
    }

    #[test]
    fn corrupted_blob_is_rejected() {
        let mut blob = MyConfig::default().to_bytes().unwrap();
        blob[0] ^= 0x5A;
        assert_eq!(MyConfig::from_bytes(&blob), None);
        assert_eq!(MyConfig::from_bytes(&[]), None);
    }

    #[test]
    fn read_policy_orders_chunks() {
        let config = MyConfig {
            chunk_sizes: vec![8, 0, 32, 16, 32],
            ..Default::default()
        };
        let policy = config.read_policy();
        assert_eq!(policy.chunk_sizes, vec![32, 16, 8]);
        assert_eq!(policy.read_floor, DEFAULT_READ_FLOOR);
        assert_eq!(ReadPolicy::default().chunk_sizes, vec![64, 32, 16, 8, 4]);
    }

    #[test]
    fn poll_interval_has_a_floor() {
        let config = MyConfig {
            poll_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
    }
}

// EOF
