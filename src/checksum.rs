//! checksum — контрольные суммы слота.
//!
//! - payload: CRC32C (Castagnoli) по несжатому payload (проверяется после распаковки);
//! - header:  crc32 (IEEE, crc32fast) по первым 40 байтам заголовка.
//!
//! Несовпадение header crc → SlotCorrupted, payload crc → CorruptPayload.

use crc32fast::Hasher as Crc32;

#[inline]
pub fn payload_crc32c(bytes: &[u8]) -> u32 {
    crc32c::crc32c(bytes)
}

#[inline]
pub fn verify_payload(bytes: &[u8], stored: u32) -> bool {
    payload_crc32c(bytes) == stored
}

#[inline]
pub fn header_crc32(bytes: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(bytes);
    h.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_crc_detects_single_bit_flip() {
        let mut data = b"level=5;gold=100".to_vec();
        let crc = payload_crc32c(&data);
        assert!(verify_payload(&data, crc));
        data[3] ^= 0x01;
        assert!(!verify_payload(&data, crc));
    }

    #[test]
    fn header_and_payload_algorithms_differ() {
        let data = [0x5Au8; 40];
        assert_ne!(header_crc32(&data), payload_crc32c(&data));
    }
}
