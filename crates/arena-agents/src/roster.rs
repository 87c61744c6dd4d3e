//! Persona rosters from TOML files.
//!
//! ```toml
//! [[persona]]
//! id = "atlas"
//! name = "Atlas"
//! provider = "openai"
//! model = "gpt-4o-mini"
//! system_prompt = "A weary stoic who distrusts every certainty."
//! temperature = 0.9
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use coordination::{MemoryStore, Persona, StoreError};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse roster: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid persona {id:?}: {reason}")]
    Invalid { id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default, rename = "persona")]
    personas: Vec<Persona>,
}

/// Parse and validate a roster document.
pub fn parse_roster(text: &str) -> Result<Vec<Persona>, RosterError> {
    let file: RosterFile = toml::from_str(text)?;
    let mut seen = HashSet::new();
    for persona in &file.personas {
        validate(persona)?;
        if !seen.insert(persona.id.as_str()) {
            return Err(invalid(persona, "duplicate id"));
        }
    }
    Ok(file.personas)
}

pub fn load_roster(path: impl AsRef<Path>) -> Result<Vec<Persona>, RosterError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_roster(&text)
}

/// Insert or replace each persona in the store. Returns how many were written.
pub fn seed_store(store: &MemoryStore, personas: Vec<Persona>) -> Result<usize, RosterError> {
    let count = personas.len();
    for persona in personas {
        store.upsert_persona(persona)?;
    }
    info!(count, "Roster seeded");
    Ok(count)
}

fn validate(persona: &Persona) -> Result<(), RosterError> {
    if persona.id.trim().is_empty() {
        return Err(invalid(persona, "id must not be empty"));
    }
    if persona.name.trim().is_empty() {
        return Err(invalid(persona, "name must not be empty"));
    }
    if persona.model.trim().is_empty() {
        return Err(invalid(persona, "model must not be empty"));
    }
    if !(0.0..=2.0).contains(&persona.temperature) {
        return Err(invalid(persona, "temperature must be within 0.0..=2.0"));
    }
    Ok(())
}

fn invalid(persona: &Persona, reason: &str) -> RosterError {
    RosterError::Invalid {
        id: persona.id.clone(),
        reason: reason.to_string(),
    }
}
