//! Metadata keys that only the main document or the engine may set.
//!
//! The set is closed: a key is reserved exactly when its first path segment equals one
//! of [`ReservedKey::ALL`]. Imported metadata and caller-supplied extra metadata are
//! filtered against it before merging.

use serde_json::{Map, Value};

use super::flatten::split_path;
use crate::constants::CROSS_REFERENCES_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKey {
    LevelOne,
    LevelTwo,
    LevelThree,
    LevelFour,
    LevelFive,
    LevelSix,
    LevelSeven,
    LevelEight,
    LevelNine,
    LevelIndent,
    ForceCommands,
    ForceCommandsCamel,
    Commands,
    MetaYamlOutput,
    MetaJsonOutput,
    MetaOutputPath,
    PipelineConfig,
    CrossReferences,
}

impl ReservedKey {
    pub const ALL: [ReservedKey; 18] = [
        ReservedKey::LevelOne,
        ReservedKey::LevelTwo,
        ReservedKey::LevelThree,
        ReservedKey::LevelFour,
        ReservedKey::LevelFive,
        ReservedKey::LevelSix,
        ReservedKey::LevelSeven,
        ReservedKey::LevelEight,
        ReservedKey::LevelNine,
        ReservedKey::LevelIndent,
        ReservedKey::ForceCommands,
        ReservedKey::ForceCommandsCamel,
        ReservedKey::Commands,
        ReservedKey::MetaYamlOutput,
        ReservedKey::MetaJsonOutput,
        ReservedKey::MetaOutputPath,
        ReservedKey::PipelineConfig,
        ReservedKey::CrossReferences,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReservedKey::LevelOne => "level-one",
            ReservedKey::LevelTwo => "level-two",
            ReservedKey::LevelThree => "level-three",
            ReservedKey::LevelFour => "level-four",
            ReservedKey::LevelFive => "level-five",
            ReservedKey::LevelSix => "level-six",
            ReservedKey::LevelSeven => "level-seven",
            ReservedKey::LevelEight => "level-eight",
            ReservedKey::LevelNine => "level-nine",
            ReservedKey::LevelIndent => "level-indent",
            ReservedKey::ForceCommands => "force_commands",
            ReservedKey::ForceCommandsCamel => "forceCommands",
            ReservedKey::Commands => "commands",
            ReservedKey::MetaYamlOutput => "meta-yaml-output",
            ReservedKey::MetaJsonOutput => "meta-json-output",
            ReservedKey::MetaOutputPath => "meta-output-path",
            ReservedKey::PipelineConfig => "pipeline-config",
            ReservedKey::CrossReferences => CROSS_REFERENCES_KEY,
        }
    }

    /// Exact match against a top-level metadata key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl std::fmt::Display for ReservedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when the flattened `path` lives under a reserved top-level key.
pub fn is_reserved(path: &str) -> bool {
    split_path(path).first().is_some_and(|head| ReservedKey::from_key(head).is_some())
}

/// Remove reserved paths from a flattened map, returning them in map order.
pub fn filter_reserved(flat: &mut Map<String, Value>) -> Vec<String> {
    let removed: Vec<String> = flat.keys().filter(|k| is_reserved(k)).cloned().collect();
    for key in &removed {
        flat.remove(key);
    }
    removed
}
