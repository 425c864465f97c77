// src/consts.rs — форматные константы слота сохранения.
//
// Формат файла слота (LE), заголовок 44 байта:
// MAGIC8 = "SGSAVE01"
// u32 format_version  = 1
// u32 flags           (bits 0..1 — кодек payload: 0=none,1=zlib,2=zstd)
// u32 schema_version  (версия схемы сохранённого типа)
// u64 created_ms      (unix time, ms)
// u64 payload_len     (длина хранимых байт payload, после сжатия)
// u32 payload_crc32c  (CRC32C по несжатому payload)
// u32 header_crc32    (crc32 по байтам заголовка [0..40))
// затем payload_len байт payload.

// ---- Заголовок ----

pub const SAVE_MAGIC: &[u8; 8] = b"SGSAVE01";
pub const SAVE_FORMAT_VERSION: u32 = 1;
pub const SAVE_HDR_SIZE: usize = 44;

pub const HDR_OFF_MAGIC: usize = 0;
pub const HDR_OFF_FORMAT: usize = 8;
pub const HDR_OFF_FLAGS: usize = 12;
pub const HDR_OFF_SCHEMA: usize = 16;
pub const HDR_OFF_CREATED_MS: usize = 20;
pub const HDR_OFF_PAYLOAD_LEN: usize = 28;
pub const HDR_OFF_PAYLOAD_CRC: usize = 36;
pub const HDR_OFF_HEADER_CRC: usize = 40;

pub const FLAGS_CODEC_MASK: u32 = 0b11;

pub const CODEC_NONE: u8 = 0;
pub const CODEC_ZLIB: u8 = 1;
pub const CODEC_ZSTD: u8 = 2;

/// Upper bound for a stored payload; anything larger is treated as a damaged header.
pub const MAX_PAYLOAD_LEN: u64 = 1 << 30;

// ---- Имена файлов ----

pub const SAVE_EXT: &str = ".sav";
pub const STAGING_SUFFIX: &str = ".tmp";
pub const BACKUP_SUFFIX: &str = ".bak";
pub const LOCK_FILE: &str = "LOCK";

pub const SLOT_PREFIX_INDEX: &str = "slot-";
pub const SLOT_PREFIX_AUTO: &str = "auto-";
pub const SLOT_PREFIX_NAMED: &str = "named-";

pub const MAX_SLOT_NAME_LEN: usize = 64;

// ---- Codec ----

/// Maximum nesting of lists/records/options accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 128;
