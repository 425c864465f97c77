//! slot — logical slots ⇄ files on disk.
//!
//! Layout of a save directory:
//!   <root>/LOCK                  fs2 lock (exclusive for the writer)
//!   <root>/slot-00000003.sav     numbered slot
//!   <root>/auto-0001.sav         autosave ring entry
//!   <root>/named-<name>.sav      named slot
//!   <root>/<file>.sav.bak        last known-good copy (keep_backup)
//!   <root>/<file>.sav.tmp        staging file (exists only mid-write or after a crash)

pub mod compress;
pub mod header;
pub mod id;
pub mod manager;
pub mod verify;

pub use compress::PayloadCodec;
pub use header::SaveHeader;
pub use id::SlotId;
pub use manager::{SlotManager, StagedWrite};
pub use verify::{CheckStatus, SlotCheck, VerifyReport};

use serde::Serialize;
use std::path::PathBuf;

use crate::checksum::payload_crc32c;
use crate::codec::peek_type_name;
use crate::error::SaveResult;

/// One persisted save: the payload plus what the header says about it.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRecord {
    pub slot: SlotId,
    pub schema_version: u32,
    pub created_ms: u64,
    /// Codec at rest (on read) or requested for the write.
    pub codec: PayloadCodec,
    /// Uncompressed payload document.
    pub payload: Vec<u8>,
    /// CRC32C of `payload`.
    pub checksum: u32,
}

impl SaveRecord {
    pub fn new(slot: SlotId, schema_version: u32, payload: Vec<u8>) -> Self {
        let checksum = payload_crc32c(&payload);
        Self {
            slot,
            schema_version,
            created_ms: crate::util::now_millis(),
            codec: PayloadCodec::default(),
            payload,
            checksum,
        }
    }

    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Type name stored at the head of the payload document.
    pub fn type_name(&self) -> SaveResult<String> {
        peek_type_name(&self.payload)
    }

    pub fn checksum_ok(&self) -> bool {
        payload_crc32c(&self.payload) == self.checksum
    }
}

/// Read-only view of a slot, built from directory metadata and the header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotDescriptor {
    pub slot: SlotId,
    pub path: PathBuf,
    pub exists: bool,
    pub modified_ms: Option<u64>,
    /// None when the header is unreadable.
    pub schema_version: Option<u32>,
    pub created_ms: Option<u64>,
    pub payload_len: Option<u64>,
    pub has_backup: bool,
}
