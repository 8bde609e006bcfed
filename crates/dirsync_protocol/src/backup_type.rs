//! Backup policy codes.

use crate::error::ProtocolError;
use dirsync_codec::{read_code, write_code, CodecError, CodecResult, TypedBuffer, WireValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the target side treats files that are absent on the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupType {
    /// No policy chosen; rejected by servers.
    #[default]
    None,
    /// Target mirrors the source; extra files are deleted.
    Mirror,
    /// Target keeps everything it ever received.
    Preserve,
    /// Target stores files in per-day folders by modification date.
    DateSeparated,
    /// Changes flow both ways, reconciled through operation logs.
    TwoWaySync,
}

impl BackupType {
    /// Every backup type.
    pub const ALL: [BackupType; 5] = [
        Self::None,
        Self::Mirror,
        Self::Preserve,
        Self::DateSeparated,
        Self::TwoWaySync,
    ];

    /// Two-byte wire code.
    pub fn code(self) -> &'static [u8; 2] {
        match self {
            Self::None => b"NO",
            Self::Mirror => b"MI",
            Self::Preserve => b"PR",
            Self::DateSeparated => b"DA",
            Self::TwoWaySync => b"TW",
        }
    }

    /// Looks up a wire code.
    pub fn from_code(code: &[u8; 2]) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.code() == code)
    }

    /// Name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mirror => "mirror",
            Self::Preserve => "preserve",
            Self::DateSeparated => "date-separated",
            Self::TwoWaySync => "two-way-sync",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackupType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == wanted)
            .ok_or_else(|| ProtocolError::invalid_line(format!("unknown backup type {s:?}")))
    }
}

impl WireValue for BackupType {
    const TYPE_NAME: &'static str = "BackupType";

    fn write_to(&self, buffer: &mut TypedBuffer) {
        write_code(buffer, self.code());
    }

    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self> {
        let code = read_code(buffer)?;
        Self::from_code(&code).ok_or_else(|| CodecError::unknown_code(Self::TYPE_NAME, &code))
    }
}
