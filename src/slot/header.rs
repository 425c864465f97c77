//! slot/header — 44-байтовый заголовок файла слота (LE).
//!
//! [0..8)   MAGIC "SGSAVE01"
//! [8..12)  u32 format_version (=1)
//! [12..16) u32 flags (биты 0..1 — кодек payload)
//! [16..20) u32 schema_version
//! [20..28) u64 created_ms
//! [28..36) u64 payload_len (байт на диске после заголовка)
//! [36..40) u32 payload_crc32c (по распакованному payload)
//! [40..44) u32 header_crc32 (crc32fast по [0..40))
//!
//! decode() возвращает текст причины; классификацию (SlotCorrupted) делает менеджер.

use byteorder::{ByteOrder, LittleEndian};

use super::compress::PayloadCodec;
use crate::checksum::header_crc32;
use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveHeader {
    pub codec: PayloadCodec,
    pub schema_version: u32,
    pub created_ms: u64,
    pub payload_len: u64,
    pub payload_crc: u32,
}

impl SaveHeader {
    pub fn encode(&self) -> [u8; SAVE_HDR_SIZE] {
        let mut b = [0u8; SAVE_HDR_SIZE];
        b[HDR_OFF_MAGIC..HDR_OFF_MAGIC + 8].copy_from_slice(SAVE_MAGIC);
        LittleEndian::write_u32(&mut b[HDR_OFF_FORMAT..HDR_OFF_FORMAT + 4], SAVE_FORMAT_VERSION);
        LittleEndian::write_u32(
            &mut b[HDR_OFF_FLAGS..HDR_OFF_FLAGS + 4],
            self.codec.id() as u32 & FLAGS_CODEC_MASK,
        );
        LittleEndian::write_u32(&mut b[HDR_OFF_SCHEMA..HDR_OFF_SCHEMA + 4], self.schema_version);
        LittleEndian::write_u64(
            &mut b[HDR_OFF_CREATED_MS..HDR_OFF_CREATED_MS + 8],
            self.created_ms,
        );
        LittleEndian::write_u64(
            &mut b[HDR_OFF_PAYLOAD_LEN..HDR_OFF_PAYLOAD_LEN + 8],
            self.payload_len,
        );
        LittleEndian::write_u32(
            &mut b[HDR_OFF_PAYLOAD_CRC..HDR_OFF_PAYLOAD_CRC + 4],
            self.payload_crc,
        );
        let crc = header_crc32(&b[..HDR_OFF_HEADER_CRC]);
        LittleEndian::write_u32(&mut b[HDR_OFF_HEADER_CRC..HDR_OFF_HEADER_CRC + 4], crc);
        b
    }

    pub fn decode(b: &[u8]) -> Result<SaveHeader, String> {
        if b.len() < SAVE_HDR_SIZE {
            return Err(format!(
                "truncated header ({} of {} bytes)",
                b.len(),
                SAVE_HDR_SIZE
            ));
        }
        if &b[HDR_OFF_MAGIC..HDR_OFF_MAGIC + 8] != SAVE_MAGIC {
            return Err("bad magic".to_string());
        }
        let stored = LittleEndian::read_u32(&b[HDR_OFF_HEADER_CRC..HDR_OFF_HEADER_CRC + 4]);
        let calc = header_crc32(&b[..HDR_OFF_HEADER_CRC]);
        if stored != calc {
            return Err(format!(
                "header checksum mismatch (stored={:#010x}, calc={:#010x})",
                stored, calc
            ));
        }
        let format = LittleEndian::read_u32(&b[HDR_OFF_FORMAT..HDR_OFF_FORMAT + 4]);
        if format != SAVE_FORMAT_VERSION {
            return Err(format!("unsupported file format v{format}"));
        }
        let flags = LittleEndian::read_u32(&b[HDR_OFF_FLAGS..HDR_OFF_FLAGS + 4]);
        let codec = PayloadCodec::from_id((flags & FLAGS_CODEC_MASK) as u8)
            .ok_or_else(|| format!("unknown payload codec in flags {flags:#x}"))?;
        let payload_len = LittleEndian::read_u64(&b[HDR_OFF_PAYLOAD_LEN..HDR_OFF_PAYLOAD_LEN + 8]);
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(format!("payload_len {payload_len} exceeds limit"));
        }
        Ok(SaveHeader {
            codec,
            schema_version: LittleEndian::read_u32(&b[HDR_OFF_SCHEMA..HDR_OFF_SCHEMA + 4]),
            created_ms: LittleEndian::read_u64(&b[HDR_OFF_CREATED_MS..HDR_OFF_CREATED_MS + 8]),
            payload_len,
            payload_crc: LittleEndian::read_u32(&b[HDR_OFF_PAYLOAD_CRC..HDR_OFF_PAYLOAD_CRC + 4]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SaveHeader {
        SaveHeader {
            codec: PayloadCodec::Zstd,
            schema_version: 3,
            created_ms: 1_700_000_000_123,
            payload_len: 512,
            payload_crc: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn encode_decode() {
        let b = sample().encode();
        assert_eq!(&b[..8], SAVE_MAGIC);
        assert_eq!(SaveHeader::decode(&b).unwrap(), sample());
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let b = sample().encode();
        for i in 0..SAVE_HDR_SIZE {
            for bit in 0..8 {
                let mut d = b;
                d[i] ^= 1 << bit;
                assert!(SaveHeader::decode(&d).is_err(), "flip at byte {i} bit {bit}");
            }
        }
    }

    #[test]
    fn short_buffer() {
        let b = sample().encode();
        let err = SaveHeader::decode(&b[..20]).unwrap_err();
        assert!(err.contains("truncated"));
    }
}
