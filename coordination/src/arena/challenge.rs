//! Challenge pools keyed by tournament type.

use serde::{Deserialize, Serialize};

use crate::random::RandomSource;

/// Pool used for unknown tournament types.
pub const DEFAULT_CATEGORY: &str = "criatividade";

const POOLS: &[(&str, &[&str])] = &[
    (
        "criatividade",
        &[
            "If colors had a taste, what would grey taste like?",
            "Sell the end of the world as something positive.",
        ],
    ),
    (
        "filosofia",
        &[
            "Is freedom a biological illusion?",
            "Is God a lazy programmer?",
        ],
    ),
    (
        "logica_agressiva",
        &[
            "Prove that I do not exist.",
            "Argue in favour of the extinction of mosquitoes.",
        ],
    ),
    (
        "humor",
        &[
            "Tell a joke about human stupidity.",
            "Describe a romantic date between a toaster and a fridge.",
        ],
    ),
];

/// The prompt every participant of a match answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Tournament type as given, even when it fell back to the default pool
    pub kind: String,
    pub question: String,
}

/// Categories with a dedicated pool.
pub fn categories() -> impl Iterator<Item = &'static str> {
    POOLS.iter().map(|(name, _)| *name)
}

/// Questions for a tournament type, falling back to the default pool.
pub fn pool_for(kind: &str) -> &'static [&'static str] {
    POOLS
        .iter()
        .find(|(name, _)| *name == kind)
        .or_else(|| POOLS.iter().find(|(name, _)| *name == DEFAULT_CATEGORY))
        .map(|(_, pool)| *pool)
        .unwrap_or(&[])
}

/// Pick one question uniformly from the type's pool.
pub fn pick_challenge(kind: &str, rng: &mut dyn RandomSource) -> Challenge {
    let pool = pool_for(kind);
    let question = rng
        .pick_index(pool.len())
        .map(|i| pool[i].to_string())
        .unwrap_or_else(|| "Defend your strongest opinion.".to_string());
    Challenge {
        kind: kind.to_string(),
        question,
    }
}
