//! Track processing stage definitions
//!
//! Supporting types for importer processing-state reporting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Long-running background stage a track can be in
///
/// Each stage is reported to clients when it starts (`TRACK_PROCESSING`) and
/// when it finishes (`TRACK_UPDATE` with `completed_process`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackProcess {
    /// File is in a convertible format and is being converted
    Converting,
    /// Musical key is missing or invalid and is being estimated
    KeyComputing,
    /// Purchase metadata identified the track, details are being looked up
    BeatportImport,
}

impl TrackProcess {
    /// Wire name of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackProcess::Converting => "CONVERTING",
            TrackProcess::KeyComputing => "KEY_COMPUTING",
            TrackProcess::BeatportImport => "BEATPORT_IMPORT",
        }
    }
}

impl fmt::Display for TrackProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for process in [
            TrackProcess::Converting,
            TrackProcess::KeyComputing,
            TrackProcess::BeatportImport,
        ] {
            let json = serde_json::to_string(&process).unwrap();
            assert_eq!(json, format!("\"{}\"", process.as_str()));
        }
    }
}
