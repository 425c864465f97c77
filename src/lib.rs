#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod error;
pub mod config;
pub mod metrics;
pub mod lock;
pub mod checksum;

// Утилиты (now_millis, fsync_dir, backoff_delay)
pub mod util;   // src/util/mod.rs

// Ядро: codec → slot → migrate → orchestrator
pub mod codec;        // src/codec/{mod,value,wire,graph,traits}.rs
pub mod slot;         // src/slot/{mod,id,header,compress,manager,verify}.rs
pub mod migrate;      // src/migrate.rs
pub mod orchestrator; // src/orchestrator/{mod,handle,queue}.rs

// Удобные реэкспорты
pub use codec::{
    decode, encode, DecodeCx, Document, EncodeCx, ObjRef, ObjectGraph, RecordBuilder,
    RecordReader, SaveType, Saveable, Value,
};
pub use config::{SaveBuilder, SaveConfig};
pub use error::{OpError, OpState, SaveError, SaveResult};
pub use migrate::{Migrator, MigratorBuilder};
pub use orchestrator::{OpHandle, SaveOrchestrator};
pub use slot::{PayloadCodec, SaveRecord, SlotDescriptor, SlotId, SlotManager};
