//! Patch notation handling
//!
//! The community numbers patches by season on a display scale that runs ten
//! ahead of the game client's own major version: display patch `25.10` ships
//! as game version `15.10.x`. Matches report the client version, so the
//! requested display patch must be converted to a client-version prefix
//! before filtering.

use crate::errors::CollectError;

/// Offset between the display season and the client major version
const DISPLAY_SEASON_OFFSET: u32 = 10;

/// Display majors at or above this are on the community scale and need the
/// offset applied; smaller majors are already client-scale and pass through.
const DISPLAY_SCALE_START: u32 = 20;

/// Convert a display patch ("25.10") into the game-version prefix matches
/// must start with ("15.10.")
pub fn game_version_prefix(patch: &str) -> Result<String, CollectError> {
    let trimmed = patch.trim();
    let mut parts = trimmed.splitn(2, '.');

    let major: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| malformed(trimmed))?;
    let minor: u32 = parts
        .next()
        .and_then(|p| p.split('.').next())
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| malformed(trimmed))?;

    let client_major = if major >= DISPLAY_SCALE_START {
        major - DISPLAY_SEASON_OFFSET
    } else {
        major
    };

    Ok(format!("{}.{}.", client_major, minor))
}

/// Whether a reported game version belongs to the requested patch
pub fn version_matches(game_version: &str, prefix: &str) -> bool {
    game_version.starts_with(prefix)
}

fn malformed(patch: &str) -> CollectError {
    CollectError::MalformedTelemetry {
        match_id: String::new(),
        detail: format!("unparseable patch notation '{}'", patch),
    }
}
