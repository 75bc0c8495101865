// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Version information exchanged at registration and the compatibility check
//! applied to it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of a broker or client library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    #[serde(default)]
    pub tweak: u16,
    #[serde(default)]
    pub build_date: String,
    #[serde(default)]
    pub commit_id: String,
}

impl VersionInfo {
    /// Version of this build. Build date and commit id are taken from the
    /// `SHMQ_BUILD_DATE` / `SHMQ_COMMIT_ID` environment at compile time.
    pub fn current() -> Self {
        Self {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
            tweak: 0,
            build_date: option_env!("SHMQ_BUILD_DATE").unwrap_or("unknown").to_string(),
            commit_id: option_env!("SHMQ_COMMIT_ID").unwrap_or("unknown").to_string(),
        }
    }

    /// Check `other` against `self` at the given strictness.
    ///
    /// Every level compares the fields of the previous one plus its own.
    /// `Warn` compares everything but only logs a mismatch.
    pub fn is_compatible(&self, other: &VersionInfo, level: CompatibilityCheckLevel) -> bool {
        let numbers = (self.major, self.minor, self.patch, self.tweak);
        let other_numbers = (other.major, other.minor, other.patch, other.tweak);
        match level {
            CompatibilityCheckLevel::Off => true,
            CompatibilityCheckLevel::Warn => {
                if self != other {
                    log::warn!("[Version] broker {} and client {} differ", self, other);
                }
                true
            }
            CompatibilityCheckLevel::Major => self.major == other.major,
            CompatibilityCheckLevel::Minor => {
                self.major == other.major && self.minor == other.minor
            }
            CompatibilityCheckLevel::Patch => numbers == other_numbers,
            CompatibilityCheckLevel::CommitId => {
                numbers == other_numbers && self.commit_id == other.commit_id
            }
            CompatibilityCheckLevel::BuildDate => {
                numbers == other_numbers
                    && self.commit_id == other.commit_id
                    && self.build_date == other.build_date
            }
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{} ({} {})",
            self.major, self.minor, self.patch, self.tweak, self.commit_id, self.build_date
        )
    }
}

/// Strictness of the registration version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityCheckLevel {
    Off,
    Warn,
    Major,
    Minor,
    #[default]
    Patch,
    CommitId,
    BuildDate,
}

impl FromStr for CompatibilityCheckLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "warn" => Ok(Self::Warn),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            "commit_id" => Ok(Self::CommitId),
            "build_date" => Ok(Self::BuildDate),
            other => Err(format!("unknown compatibility level '{}'", other)),
        }
    }
}
