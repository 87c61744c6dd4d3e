//! Match judging: prompt, verdict parsing, and the deterministic fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::challenge::Challenge;
use crate::gateway::{ChatMessage, CompletionGateway, CompletionRequest, GatewayError};
use crate::state::PersonaId;

/// Judge backend and sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.2,
        }
    }
}

/// Structured verdict returned by the judge model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    #[serde(rename = "winnerId", alias = "winner_id")]
    pub winner_id: PersonaId,
    pub scores: BTreeMap<PersonaId, f64>,
    pub reason: String,
}

/// Why a judge response could not be used.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge call failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("judge returned malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("judge picked {0}, who is not in the match")]
    UnknownWinner(String),

    #[error("match has no participants to judge")]
    EmptyRoster,
}

/// A verdict plus whether it came from the fallback path.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub verdict: JudgeVerdict,
    pub fallback: bool,
}

/// Build the judge prompt. `participants` maps ids to display names.
pub fn judge_prompt(
    challenge: &Challenge,
    transcript: &str,
    participants: &[(PersonaId, String)],
) -> String {
    let roster: BTreeMap<&str, &str> = participants
        .iter()
        .map(|(id, name)| (id.as_str(), name.as_str()))
        .collect();
    let roster_json = serde_json::to_string(&roster).unwrap_or_default();

    format!(
        "SUPREME JUDGE OF THE ARENA.\n\
         Analyse the debate below.\n\n\
         TOPIC: \"{question}\"\n\n\
         TRANSCRIPT:\n{transcript}\n\n\
         VICTORY CRITERIA:\n\
         1. Who showed the most personality?\n\
         2. Who escaped the polite-robot pattern?\n\
         3. Who was the most original?\n\n\
         PARTICIPANTS (real ids mapped to names):\n{roster_json}\n\n\
         Return only JSON:\n\
         {{ \"winnerId\": \"<id>\", \"scores\": {{ \"<id>\": <number> }}, \"reason\": \"<string>\" }}",
        question = challenge.question,
    )
}

/// Remove markdown code fences around a JSON payload.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse a judge response, requiring the winner to be a participant.
///
/// Scores for ids outside the roster are discarded.
pub fn parse_verdict(raw: &str, participant_ids: &[PersonaId]) -> Result<JudgeVerdict, JudgeError> {
    let cleaned = strip_code_fences(raw);
    let mut verdict: JudgeVerdict = match serde_json::from_str(&cleaned) {
        Ok(verdict) => verdict,
        Err(e) => match (cleaned.find('{'), cleaned.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str(&cleaned[start..=end]).map_err(|_| JudgeError::Malformed(e))?
            }
            _ => return Err(JudgeError::Malformed(e)),
        },
    };

    if !participant_ids.contains(&verdict.winner_id) {
        return Err(JudgeError::UnknownWinner(verdict.winner_id));
    }
    verdict.scores.retain(|id, _| participant_ids.contains(id));
    Ok(verdict)
}

/// First participant wins with empty scores.
pub fn fallback_verdict(participant_ids: &[PersonaId], cause: &str) -> Result<JudgeVerdict, JudgeError> {
    let winner_id = participant_ids.first().cloned().ok_or(JudgeError::EmptyRoster)?;
    Ok(JudgeVerdict {
        winner_id,
        scores: BTreeMap::new(),
        reason: format!("Technical draw (judge failed: {cause})"),
    })
}

/// Ask the judge model for a verdict, falling back on any failure.
pub async fn judge_match(
    gateway: &dyn CompletionGateway,
    config: &JudgeConfig,
    challenge: &Challenge,
    transcript: &str,
    participants: &[(PersonaId, String)],
) -> Result<Judgment, JudgeError> {
    let ids: Vec<PersonaId> = participants.iter().map(|(id, _)| id.clone()).collect();
    if ids.is_empty() {
        return Err(JudgeError::EmptyRoster);
    }

    let request = CompletionRequest::new(&config.provider, &config.model)
        .with_message(ChatMessage::user(judge_prompt(challenge, transcript, participants)))
        .with_temperature(config.temperature);

    let parsed = match gateway.complete(&request).await {
        Ok(response) => parse_verdict(&response.content, &ids),
        Err(e) => Err(JudgeError::from(e)),
    };

    match parsed {
        Ok(verdict) => {
            info!(winner = %verdict.winner_id, "Judge verdict accepted");
            Ok(Judgment {
                verdict,
                fallback: false,
            })
        }
        Err(e) => {
            warn!(error = %e, "Judge failed, first participant wins");
            Ok(Judgment {
                verdict: fallback_verdict(&ids, &e.to_string())?,
                fallback: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{CompletionResponse, MockCompletionGateway};

    fn ids() -> Vec<PersonaId> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn roster() -> Vec<(PersonaId, String)> {
        vec![("a".into(), "Atlas".into()), ("b".into(), "Nyx".into())]
    }

    fn challenge() -> Challenge {
        Challenge {
            kind: "humor".into(),
            question: "Why?".into(),
        }
    }

    #[test]
    fn test_parse_fenced_verdict() {
        let raw = "```json\n{\"winnerId\":\"b\",\"scores\":{\"a\":6,\"b\":9,\"zed\":1},\"reason\":\"bold\"}\n```";
        let verdict = parse_verdict(raw, &ids()).unwrap();
        assert_eq!(verdict.winner_id, "b");
        assert_eq!(verdict.scores.len(), 2);
        assert_eq!(verdict.scores["b"], 9.0);
    }

    #[test]
    fn test_parse_verdict_wrapped_in_prose() {
        let raw = "Here you go: {\"winnerId\":\"a\",\"scores\":{},\"reason\":\"ok\"} Thanks.";
        assert_eq!(parse_verdict(raw, &ids()).unwrap().winner_id, "a");
    }

    #[test]
    fn test_parse_rejects_outsider_and_missing_keys() {
        let outsider = r#"{"winnerId":"zed","scores":{},"reason":"x"}"#;
        assert!(matches!(
            parse_verdict(outsider, &ids()),
            Err(JudgeError::UnknownWinner(_))
        ));

        let missing = r#"{"winnerId":"a"}"#;
        assert!(matches!(parse_verdict(missing, &ids()), Err(JudgeError::Malformed(_))));
        assert!(parse_verdict("no json at all", &ids()).is_err());
    }

    #[test]
    fn test_prompt_lists_roster() {
        let prompt = judge_prompt(&challenge(), "Atlas: hi", &roster());
        assert!(prompt.contains(r#"{"a":"Atlas","b":"Nyx"}"#));
        assert!(prompt.contains("\"Why?\""));
        assert!(prompt.contains("winnerId"));
    }

    #[tokio::test]
    async fn test_judge_uses_low_temperature_and_parses() {
        let mut gateway = MockCompletionGateway::new();
        gateway
            .expect_complete()
            .withf(|req| {
                req.provider == "openai"
                    && req.model == "gpt-3.5-turbo"
                    && req.temperature == Some(0.2)
                    && req.messages.len() == 1
            })
            .returning(|_| {
                Ok(CompletionResponse {
                    content: r#"{"winnerId":"b","scores":{"a":4,"b":8},"reason":"sharper"}"#.into(),
                    model: "gpt-3.5-turbo".into(),
                    served_by: "mock".into(),
                    degraded: false,
                    latency_ms: 0,
                })
            });

        let judgment = judge_match(&gateway, &JudgeConfig::default(), &challenge(), "t", &roster())
            .await
            .unwrap();
        assert!(!judgment.fallback);
        assert_eq!(judgment.verdict.winner_id, "b");
    }

    #[tokio::test]
    async fn test_judge_gateway_error_falls_back_to_first() {
        let mut gateway = MockCompletionGateway::new();
        gateway
            .expect_complete()
            .returning(|_| Err(GatewayError::Unavailable("down".into())));

        let judgment = judge_match(&gateway, &JudgeConfig::default(), &challenge(), "t", &roster())
            .await
            .unwrap();
        assert!(judgment.fallback);
        assert_eq!(judgment.verdict.winner_id, "a");
        assert!(judgment.verdict.scores.is_empty());
        assert!(judgment.verdict.reason.contains("judge failed"));
    }
}
