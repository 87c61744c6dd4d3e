//! Match Engine: bounded, judged contests between personas
//!
//! ```text
//! pending ──run_match──▶ running ──rounds × roster──▶ judge ──▶ finished
//! ```
//!
//! - `challenge`: per-category question pools
//! - `judge`: judge prompt, verdict parsing, fallback verdict
//! - `engine`: tournament bookkeeping and match execution

pub mod challenge;
pub mod engine;
pub mod judge;

pub use challenge::{pick_challenge, Challenge, DEFAULT_CATEGORY};
pub use engine::{MatchConfig, MatchEngine};
pub use judge::{JudgeConfig, JudgeError, JudgeVerdict, Judgment};
