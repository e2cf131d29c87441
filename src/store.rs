//! Durable persona state — one JSON file per persona.
//!
//! The engine itself never touches disk; this store is the default
//! persistence the surrounding service plugs in around
//! [`crate::engine::Engine::process_turn`]. Files follow the
//! `state_<persona>.json` naming convention and the persisted-state
//! schema of [`crate::state::PersonaState`].
//!
//! Two guarantees the store makes:
//!
//! - Saves are atomic: the new document is written to a temp file in
//!   the same directory and renamed over the old one, so a crash
//!   mid-write cannot leave a half-written state file.
//! - Turns for the same persona are serialized by a per-persona mutex,
//!   closing the read-modify-write race between concurrent turns in
//!   one process. Concurrent turns from *different* processes remain
//!   unprotected; that coordination belongs to the host.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::EngineError;
use crate::state::PersonaState;

/// File-backed store of per-persona state.
pub struct PersonaStateStore {
    directory: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PersonaStateStore {
    /// Create a store rooted at `directory`. The directory is created
    /// on first save, not here.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the state file for one persona.
    pub fn state_path(&self, persona: &str) -> PathBuf {
        self.directory.join(format!("state_{persona}.json"))
    }

    /// Load a persona's state, or the zero-initialized first-turn
    /// state when no file exists yet.
    pub fn load(&self, persona: &str) -> Result<PersonaState, EngineError> {
        let path = self.state_path(persona);
        if !path.exists() {
            debug!("no state file for '{persona}', starting fresh");
            return Ok(PersonaState::initial());
        }

        let content = std::fs::read_to_string(&path)?;
        let mut document: Value = serde_json::from_str(&content)
            .map_err(|e| EngineError::State(format!("{}: {e}", path.display())))?;

        migrate_legacy_relation_axes(&mut document, persona);

        serde_json::from_value(document)
            .map_err(|e| EngineError::State(format!("{}: {e}", path.display())))
    }

    /// Atomically persist a persona's state.
    pub fn save(&self, persona: &str, state: &PersonaState) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.directory)?;

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| EngineError::State(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.directory)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(self.state_path(persona))
            .map_err(|e| EngineError::Io(e.error))?;
        Ok(())
    }

    /// Run one load → update → save turn under the persona's lock.
    ///
    /// `turn` receives the current state and returns the state to
    /// persist; its second return value passes through to the caller
    /// (typically the fused phase).
    pub fn with_turn<T>(
        &self,
        persona: &str,
        turn: impl FnOnce(PersonaState) -> (PersonaState, T),
    ) -> Result<(PersonaState, T), EngineError> {
        let lock = self.persona_lock(persona);
        let _guard = lock.lock();

        let prior = self.load(persona)?;
        let (next, extra) = turn(prior);
        self.save(persona, &next)?;
        Ok((next, extra))
    }

    fn persona_lock(&self, persona: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(persona.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Fold the pre-relation-graph schema into the current one: a
/// top-level `relation_axes` object becomes `relations.user`.
fn migrate_legacy_relation_axes(document: &mut Value, persona: &str) {
    let Some(object) = document.as_object_mut() else {
        return;
    };
    if let Some(legacy) = object.remove("relation_axes") {
        warn!("migrating legacy relation_axes for '{persona}'");
        if let Some(relations) = object
            .entry("relations")
            .or_insert_with(|| Value::Object(Default::default()))
            .as_object_mut()
        {
            relations.insert("user".to_string(), legacy);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_missing_file_yields_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStateStore::new(dir.path());
        let state = store.load("nobody").unwrap();
        assert_eq!(state, PersonaState::initial());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStateStore::new(dir.path());

        let mut state = PersonaState::initial();
        state.emotion_axes.set("joy", 0.4);
        state.phase_weights.insert("calm".to_string(), 1.0);
        state.dominant_phase = Some("calm".to_string());

        store.save("warlord", &state).unwrap();
        let loaded = store.load("warlord").unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_legacy_relation_axes_migrated_to_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStateStore::new(dir.path());

        std::fs::write(
            store.state_path("old"),
            r#"{
                "emotion_axes": {"joy": 0.1},
                "relation_axes": {"Trust": 0.7}
            }"#,
        )
        .unwrap();

        let state = store.load("old").unwrap();
        assert_eq!(state.relations.get("user").unwrap().trust, 0.7);
        assert_eq!(state.emotion_axes.joy, 0.1);
    }

    #[test]
    fn test_corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStateStore::new(dir.path());
        std::fs::write(store.state_path("bad"), "{{{{").unwrap();
        assert!(matches!(store.load("bad"), Err(EngineError::State(_))));
    }

    #[test]
    fn test_with_turn_persists_result() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStateStore::new(dir.path());

        let (next, tag) = store
            .with_turn("warlord", |mut state| {
                state.emotion_axes.set("anger", 0.5);
                (state, "done")
            })
            .unwrap();

        assert_eq!(tag, "done");
        assert_eq!(next.emotion_axes.anger, 0.5);
        assert_eq!(store.load("warlord").unwrap(), next);
    }

    #[test]
    fn test_turns_serialized_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersonaStateStore::new(dir.path()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store
                    .with_turn("shared", |mut state| {
                        // Read-modify-write that would lose updates
                        // without the per-persona lock.
                        let n = state.phase_weights.get("turns").copied().unwrap_or(0.0);
                        state.phase_weights.insert("turns".to_string(), n + 1.0);
                        (state, ())
                    })
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let state = store.load("shared").unwrap();
        assert_eq!(state.phase_weights["turns"], 8.0);
    }

    #[test]
    fn test_state_path_convention() {
        let store = PersonaStateStore::new("/data/personas");
        assert_eq!(
            store.state_path("warlord"),
            Path::new("/data/personas/state_warlord.json")
        );
    }
}
