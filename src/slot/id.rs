//! slot/id — logical slot identifiers and their file names.
//!
//!   Index(3)          <-> slot-00000003.sav
//!   Autosave(1)       <-> auto-0001.sav
//!   Named("slot1")    <-> named-slot1.sav
//!
//! Text form (CLI, logs): "3", "auto:1", "slot1".

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::consts::{
    MAX_SLOT_NAME_LEN, SAVE_EXT, SLOT_PREFIX_AUTO, SLOT_PREFIX_INDEX, SLOT_PREFIX_NAMED,
};
use crate::error::{SaveError, SaveResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotId {
    Index(u32),
    Autosave(u32),
    Named(String),
}

impl SlotId {
    /// Validated named slot: 1..=64 chars of [A-Za-z0-9_-], not all digits.
    pub fn named(name: impl Into<String>) -> SaveResult<SlotId> {
        let name = name.into();
        let ok_chars = name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        let all_digits = name.bytes().all(|b| b.is_ascii_digit());
        if name.is_empty() || name.len() > MAX_SLOT_NAME_LEN || !ok_chars || all_digits {
            return Err(SaveError::InvalidSlotName(name));
        }
        Ok(SlotId::Named(name))
    }

    pub fn file_stem(&self) -> String {
        match self {
            SlotId::Index(i) => format!("{SLOT_PREFIX_INDEX}{i:08}"),
            SlotId::Autosave(i) => format!("{SLOT_PREFIX_AUTO}{i:04}"),
            SlotId::Named(n) => format!("{SLOT_PREFIX_NAMED}{n}"),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.file_stem(), SAVE_EXT)
    }

    /// Inverse of `file_name`. Only canonical names map back (so that
    /// `slot-3.sav` or `named-a b.sav` are ignored rather than aliased).
    pub fn from_file_name(name: &str) -> Option<SlotId> {
        let stem = name.strip_suffix(SAVE_EXT)?;
        let id = if let Some(n) = stem.strip_prefix(SLOT_PREFIX_INDEX) {
            SlotId::Index(parse_digits(n)?)
        } else if let Some(n) = stem.strip_prefix(SLOT_PREFIX_AUTO) {
            SlotId::Autosave(parse_digits(n)?)
        } else if let Some(n) = stem.strip_prefix(SLOT_PREFIX_NAMED) {
            SlotId::named(n).ok()?
        } else {
            return None;
        };
        (id.file_name() == name).then_some(id)
    }
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::Index(i) => write!(f, "{i}"),
            SlotId::Autosave(i) => write!(f, "auto:{i}"),
            SlotId::Named(n) => f.write_str(n),
        }
    }
}

impl FromStr for SlotId {
    type Err = SaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(n) = parse_digits(s) {
            return Ok(SlotId::Index(n));
        }
        if let Some(rest) = s.strip_prefix("auto:") {
            return parse_digits(rest)
                .map(SlotId::Autosave)
                .ok_or_else(|| SaveError::InvalidSlotName(s.to_string()));
        }
        SlotId::named(s)
    }
}

impl From<u32> for SlotId {
    fn from(i: u32) -> Self {
        SlotId::Index(i)
    }
}

impl Serialize for SlotId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_canonical() {
        let cases = [
            (SlotId::Index(3), "slot-00000003.sav"),
            (SlotId::Autosave(1), "auto-0001.sav"),
            (SlotId::named("slot1").unwrap(), "named-slot1.sav"),
        ];
        for (id, name) in cases {
            assert_eq!(id.file_name(), name);
            assert_eq!(SlotId::from_file_name(name), Some(id));
        }
        assert_eq!(SlotId::from_file_name("slot-3.sav"), None);
        assert_eq!(SlotId::from_file_name("named-slot1.sav.tmp"), None);
        assert_eq!(SlotId::from_file_name("LOCK"), None);
    }

    #[test]
    fn parse_text_forms() {
        assert_eq!("7".parse::<SlotId>().unwrap(), SlotId::Index(7));
        assert_eq!("auto:2".parse::<SlotId>().unwrap(), SlotId::Autosave(2));
        assert_eq!(
            "hero_01".parse::<SlotId>().unwrap(),
            SlotId::Named("hero_01".into())
        );
        assert!("auto:x".parse::<SlotId>().is_err());
        assert!("bad name".parse::<SlotId>().is_err());
        assert!(SlotId::named("").is_err());
        assert!(SlotId::named("x".repeat(65)).is_err());
    }

    #[test]
    fn ordering_groups_by_kind() {
        let mut v = vec![
            SlotId::named("b").unwrap(),
            SlotId::Autosave(0),
            SlotId::Index(10),
            SlotId::named("a").unwrap(),
            SlotId::Index(2),
        ];
        v.sort();
        let text: Vec<String> = v.iter().map(|s| s.to_string()).collect();
        assert_eq!(text, ["2", "10", "auto:0", "a", "b"]);
    }
}
