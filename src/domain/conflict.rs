use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a binary transfer does when its destination already has content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolutionMode {
    #[default]
    FailIfExists,
    DoNothingIfExists,
    Overwrite,
}

#[derive(Debug, Error)]
#[error(
    "unknown conflict resolution mode '{0}' \
     (expected fail-if-exists, do-nothing-if-exists or overwrite)"
)]
pub struct ParseModeError(String);

impl FromStr for ConflictResolutionMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-if-exists" => Ok(Self::FailIfExists),
            "do-nothing-if-exists" => Ok(Self::DoNothingIfExists),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

impl fmt::Display for ConflictResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FailIfExists => "fail-if-exists",
            Self::DoNothingIfExists => "do-nothing-if-exists",
            Self::Overwrite => "overwrite",
        };
        f.write_str(name)
    }
}
