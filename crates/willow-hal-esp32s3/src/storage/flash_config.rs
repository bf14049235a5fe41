//! Configuration file kept in a raw flash region.
//!
//! The region is the tail of the SPIFFS partition (or the first undefined
//! data partition) and holds a single record:
//! `magic | version | reserved | length | checksum | payload`.
//! The header is programmed after the payload, so an interrupted write reads
//! back as an absent file. A header from another layout reads as corrupted.

use alloc::{vec, vec::Vec};

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use log::{info, warn};
use willow_core::config::{CONFIG_PATH, ConfigStorage, ConfigWriter, MAX_CONFIG_BYTES};

const FLASH_SECTOR_SIZE: u32 = 4096;
const DEFAULT_FLASH_CAPACITY_BYTES: usize = 16 * 1024 * 1024;

const RECORD_MAGIC: u32 = 0x3146_4357; // "WCF1"
const RECORD_VERSION: u8 = 1;
const HEADER_LEN: usize = 16;
const REGION_LEN: u32 =
    ((HEADER_LEN + MAX_CONFIG_BYTES) as u32).div_ceil(FLASH_SECTOR_SIZE) * FLASH_SECTOR_SIZE;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashConfigError {
    PartitionTable,
    PartitionMissing,
    PartitionTooSmall,
    FlashOpFailed(i32),
    Corrupted,
    TooLarge,
    Unsupported,
}

#[derive(Debug)]
struct RawFlash;

impl RawFlash {
    fn new() -> Result<Self, FlashConfigError> {
        let rc = unsafe { esp_rom_spiflash_unlock() };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(Self)
    }

    fn erase_sector(&mut self, sector_addr: u32) -> Result<(), FlashConfigError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashConfigError::Unsupported);
        }

        let rc = unsafe { esp_rom_spiflash_erase_sector(sector_addr / FLASH_SECTOR_SIZE) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(())
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, FlashConfigError> {
        let mut word = 0u32;
        let rc = unsafe { esp_rom_spiflash_read(addr, &mut word as *mut u32 as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(word)
    }

    fn write_word(&mut self, addr: u32, word: u32) -> Result<(), FlashConfigError> {
        let rc = unsafe { esp_rom_spiflash_write(addr, &word as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(())
    }

    /// Word-aligned bulk read; `addr` must be 4-byte aligned.
    fn read_bytes(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashConfigError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }

        for (word_addr, chunk) in (addr..).step_by(4).zip(out.chunks_mut(4)) {
            let bytes = self.read_word(word_addr)?.to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
        Ok(())
    }

    /// Programs already-erased flash; a short tail word is padded with `0xFF`.
    fn write_erased_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashConfigError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }

        for (word_addr, chunk) in (addr..).step_by(4).zip(data.chunks(4)) {
            let mut bytes = [0xFFu8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            self.write_word(word_addr, u32::from_le_bytes(bytes))?;
        }
        Ok(())
    }
}

impl ReadStorage for RawFlash {
    type Error = FlashConfigError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl Storage for RawFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashConfigError::Unsupported)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct RecordHeader {
    len: u32,
    checksum: u32,
}

impl RecordHeader {
    fn for_payload(payload: &[u8]) -> Self {
        Self {
            len: payload.len() as u32,
            checksum: checksum32(payload),
        }
    }

    fn encode(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        buf[4] = RECORD_VERSION;
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// `None` for anything that is not a record this firmware wrote.
    fn decode(buf: &[u8; HEADER_LEN]) -> Option<Self> {
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != RECORD_MAGIC || buf[4] != RECORD_VERSION {
            return None;
        }

        Some(Self {
            len: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            checksum: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }
}

/// The persisted configuration document, backed by raw flash.
#[derive(Debug)]
pub struct FlashConfigFile {
    flash: RawFlash,
    region_addr: u32,
}

impl FlashConfigFile {
    /// Locates the record region; this is the firmware's "storage mount".
    pub fn mount() -> Result<Self, FlashConfigError> {
        let mut flash = RawFlash::new()?;

        let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
        let table = read_partition_table(&mut flash, &mut table_buf)
            .map_err(|_| FlashConfigError::PartitionTable)?;

        let mut spiffs: Option<(u32, u32)> = None;
        let mut fallback_undefined: Option<(u32, u32)> = None;

        for entry in table.iter() {
            if entry.is_read_only() {
                continue;
            }

            match entry.partition_type() {
                PartitionType::Data(DataPartitionSubType::Spiffs) => {
                    spiffs = Some((entry.offset(), entry.len()));
                    break;
                }
                PartitionType::Data(DataPartitionSubType::Undefined) => {
                    if fallback_undefined.is_none() {
                        fallback_undefined = Some((entry.offset(), entry.len()));
                    }
                }
                _ => {}
            }
        }

        let (offset, len) = spiffs
            .or(fallback_undefined)
            .ok_or(FlashConfigError::PartitionMissing)?;

        if len < REGION_LEN {
            return Err(FlashConfigError::PartitionTooSmall);
        }

        let region_addr = offset + len - REGION_LEN;
        info!(
            "{} mapped to flash 0x{:08x}..0x{:08x}",
            CONFIG_PATH,
            region_addr,
            region_addr + REGION_LEN
        );
        Ok(Self { flash, region_addr })
    }

    fn payload_addr(&self) -> u32 {
        self.region_addr + HEADER_LEN as u32
    }
}

impl ConfigStorage for FlashConfigFile {
    type Error = FlashConfigError;
    type Writer<'a> = FlashConfigWriter<'a>;

    fn read(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut buf = [0u8; HEADER_LEN];
        self.flash.read_bytes(self.region_addr, &mut buf)?;

        if buf.iter().all(|b| *b == 0xFF) {
            return Ok(None);
        }

        let Some(header) = RecordHeader::decode(&buf) else {
            warn!("{}: unrecognised record header", CONFIG_PATH);
            return Err(FlashConfigError::Corrupted);
        };

        let len = header.len as usize;
        if len > MAX_CONFIG_BYTES {
            return Err(FlashConfigError::Corrupted);
        }

        let mut payload = vec![0u8; len];
        let payload_addr = self.payload_addr();
        self.flash.read_bytes(payload_addr, &mut payload)?;
        if checksum32(&payload) != header.checksum {
            return Err(FlashConfigError::Corrupted);
        }

        Ok(Some(payload))
    }

    fn open_truncate(&mut self) -> Result<Self::Writer<'_>, Self::Error> {
        let region = self.region_addr..self.region_addr + REGION_LEN;
        for sector_addr in region.step_by(FLASH_SECTOR_SIZE as usize) {
            self.flash.erase_sector(sector_addr)?;
        }

        Ok(FlashConfigWriter {
            file: self,
            staged: Vec::new(),
        })
    }
}

/// Stages the document in RAM; `close` programs payload then header.
#[derive(Debug)]
pub struct FlashConfigWriter<'a> {
    file: &'a mut FlashConfigFile,
    staged: Vec<u8>,
}

impl ConfigWriter for FlashConfigWriter<'_> {
    type Error = FlashConfigError;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.staged.len() + bytes.len() > MAX_CONFIG_BYTES {
            return Err(FlashConfigError::TooLarge);
        }
        self.staged.extend_from_slice(bytes);
        Ok(())
    }

    fn close(self) -> Result<(), Self::Error> {
        let payload_addr = self.file.payload_addr();
        self.file
            .flash
            .write_erased_bytes(payload_addr, &self.staged)?;

        let header = RecordHeader::for_payload(&self.staged).encode();
        let region_addr = self.file.region_addr;
        self.file.flash.write_erased_bytes(region_addr, &header)
    }
}

fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
