//! Checkpointing for resumable bulk jobs
//!
//! The full job state is serialized to a JSON document every N processed
//! units, written atomically (temp file + rename) so a crash mid-write never
//! corrupts an existing checkpoint. A checkpoint only resumes a run whose
//! parameters match exactly; anything else is reported as a mismatch and the
//! job starts clean.

use crate::aggregator::BucketMap;
use crate::errors::CollectError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Parameters identifying one bulk run; a checkpoint is only valid for the
/// exact parameters it was written under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    pub patch: String,
    pub lanes: Vec<String>,
    pub player_pool: usize,
    pub matches_per_player: usize,
    pub max_matches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JobPhase {
    Discovery,
    Processing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionCheckpoint {
    pub params: JobParams,
    pub phase: JobPhase,
    /// Leaderboard players seeding the crawl (discovery output, step 1)
    pub players: Vec<String>,
    /// Per-player match-id lists fetched so far (discovery output, step 2)
    pub match_ids: HashMap<String, Vec<String>>,
    /// Deduplicated, capped processing queue (built at the phase transition)
    pub queue: Vec<String>,
    /// How many queue entries are fully folded into `buckets`
    pub processed: usize,
    pub buckets: BucketMap,
}

impl CollectionCheckpoint {
    pub fn new(params: JobParams) -> Self {
        Self {
            params,
            phase: JobPhase::Discovery,
            players: Vec::new(),
            match_ids: HashMap::new(),
            queue: Vec::new(),
            processed: 0,
            buckets: BucketMap::new(),
        }
    }

    /// Load a checkpoint for the given parameters
    ///
    /// Returns `Ok(None)` when no checkpoint exists, and
    /// `Err(CheckpointMismatch)` when one exists but belongs to a different
    /// run (the caller logs it and starts fresh).
    pub fn load(path: &Path, params: &JobParams) -> Result<Option<Self>, CollectError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let checkpoint: Self = serde_json::from_str(&content)?;

        if &checkpoint.params != params {
            return Err(CollectError::CheckpointMismatch {
                detail: format!(
                    "on disk: patch {} / {} players; requested: patch {} / {} players",
                    checkpoint.params.patch,
                    checkpoint.params.player_pool,
                    params.patch,
                    params.player_pool
                ),
            });
        }

        Ok(Some(checkpoint))
    }

    /// Atomically persist the checkpoint (write temp file, then rename)
    pub fn save(&self, path: &Path) -> Result<(), CollectError> {
        let json = serde_json::to_string(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Remove the checkpoint after a successful run
    pub fn delete(path: &Path) -> Result<(), CollectError> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> JobParams {
        JobParams {
            patch: "25.10".to_string(),
            lanes: vec!["TOP".to_string(), "MIDDLE".to_string()],
            player_pool: 50,
            matches_per_player: 20,
            max_matches: 400,
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        let mut checkpoint = CollectionCheckpoint::new(params());
        checkpoint.players = vec!["puuid-1".to_string(), "puuid-2".to_string()];
        checkpoint
            .match_ids
            .insert("puuid-1".to_string(), vec!["EUW1_1".to_string()]);
        checkpoint.phase = JobPhase::Processing;
        checkpoint.queue = vec!["EUW1_1".to_string()];
        checkpoint.processed = 1;

        checkpoint.save(&path).unwrap();
        let loaded = CollectionCheckpoint::load(&path, &params())
            .unwrap()
            .expect("checkpoint should load");

        assert_eq!(loaded.players, checkpoint.players);
        assert_eq!(loaded.phase, JobPhase::Processing);
        assert_eq!(loaded.processed, 1);
    }

    #[test]
    fn missing_checkpoint_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(CollectionCheckpoint::load(&path, &params())
            .unwrap()
            .is_none());
    }

    #[test]
    fn parameter_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        CollectionCheckpoint::new(params()).save(&path).unwrap();

        let mut other = params();
        other.patch = "25.11".to_string();

        match CollectionCheckpoint::load(&path, &other) {
            Err(CollectError::CheckpointMismatch { .. }) => {}
            other => panic!("expected CheckpointMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        CollectionCheckpoint::new(params()).save(&path).unwrap();
        assert!(path.exists());

        CollectionCheckpoint::delete(&path).unwrap();
        assert!(!path.exists());

        // Deleting a missing checkpoint is a no-op
        CollectionCheckpoint::delete(&path).unwrap();
    }
}
