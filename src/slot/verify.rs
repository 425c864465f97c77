//! slot/verify — проверка всех слотов каталога (header CRC, длина, payload CRC32C).
//!
//! Для каждого слота:
//! - основной файл валиден → ok;
//! - основной битый, .bak валиден → backup_only (read() отдаст backup);
//! - оба битые / backup нет → corrupt;
//! - ошибка ввода-вывода → io.
//! Дополнительно считаются staging-файлы (.tmp), оставшиеся после сбоев.
//!
//! Отчёт сериализуется serde_json (CLI verify --json).

use serde::Serialize;
use std::fs;

use super::id::SlotId;
use super::manager::SlotManager;
use crate::consts::STAGING_SUFFIX;
use crate::error::SaveResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    BackupOnly,
    Corrupt,
    Io,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotCheck {
    pub slot: SlotId,
    pub status: CheckStatus,
    pub schema_version: Option<u32>,
    pub type_name: Option<String>,
    pub has_backup: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub slots_total: u64,
    pub ok: u64,
    pub backup_only: u64,
    pub corrupt: u64,
    pub io_fail: u64,
    pub staging_leftovers: u64,
    pub slots: Vec<SlotCheck>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt == 0 && self.io_fail == 0
    }
}

impl SlotManager {
    pub fn verify_all(&self) -> SaveResult<VerifyReport> {
        let mut rep = VerifyReport::default();

        let mut names = Vec::new();
        for e in fs::read_dir(self.root())? {
            let e = e?;
            if let Some(n) = e.file_name().to_str() {
                names.push(n.to_string());
            }
        }
        rep.staging_leftovers = names
            .iter()
            .filter(|n| {
                n.strip_suffix(STAGING_SUFFIX)
                    .and_then(SlotId::from_file_name)
                    .is_some()
            })
            .count() as u64;

        let mut ids: Vec<SlotId> = names
            .iter()
            .filter_map(|n| SlotId::from_file_name(n))
            .collect();
        ids.sort();

        for slot in ids {
            let path = self.resolve(&slot);
            let bak = self.backup_path(&slot);
            let has_backup = bak.is_file();

            let check = match self.read_verified(&slot, &path) {
                Ok(rec) => SlotCheck {
                    schema_version: Some(rec.schema_version),
                    type_name: rec.type_name().ok(),
                    slot,
                    status: CheckStatus::Ok,
                    has_backup,
                    detail: None,
                },
                Err(e) if e.is_corruption() => {
                    let recovered = if has_backup {
                        self.read_verified(&slot, &bak).ok()
                    } else {
                        None
                    };
                    match recovered {
                        Some(rec) => SlotCheck {
                            schema_version: Some(rec.schema_version),
                            type_name: rec.type_name().ok(),
                            slot,
                            status: CheckStatus::BackupOnly,
                            has_backup,
                            detail: Some(e.to_string()),
                        },
                        None => SlotCheck {
                            slot,
                            status: CheckStatus::Corrupt,
                            schema_version: None,
                            type_name: None,
                            has_backup,
                            detail: Some(e.to_string()),
                        },
                    }
                }
                Err(e) => SlotCheck {
                    slot,
                    status: CheckStatus::Io,
                    schema_version: None,
                    type_name: None,
                    has_backup,
                    detail: Some(e.to_string()),
                },
            };

            rep.slots_total += 1;
            match check.status {
                CheckStatus::Ok => rep.ok += 1,
                CheckStatus::BackupOnly => rep.backup_only += 1,
                CheckStatus::Corrupt => rep.corrupt += 1,
                CheckStatus::Io => rep.io_fail += 1,
            }
            rep.slots.push(check);
        }
        Ok(rep)
    }
}
