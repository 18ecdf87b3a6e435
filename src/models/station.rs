use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ProcessingError;

/// Composite `USAF:WBAN` station identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId {
    pub usaf: String,
    pub wban: String,
}

impl StationId {
    pub fn new(usaf: impl Into<String>, wban: impl Into<String>) -> Self {
        Self {
            usaf: usaf.into(),
            wban: wban.into(),
        }
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.usaf, self.wban)
    }
}

impl FromStr for StationId {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((usaf, wban)) if !usaf.is_empty() && !wban.is_empty() && !wban.contains(':') => {
                Ok(StationId::new(usaf, wban))
            }
            _ => Err(ProcessingError::InvalidInput(format!(
                "Invalid station id: '{}'. Expected format: 'USAF:WBAN'",
                s
            ))),
        }
    }
}

impl Serialize for StationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
