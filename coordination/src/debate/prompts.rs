//! Prompt text and context mapping for debate turns.

use std::collections::HashMap;

use crate::gateway::ChatMessage;
use crate::state::{Persona, Sender, Utterance};

/// Label used for the topic-injection sender in multi-party history.
pub const SYSTEM_LABEL: &str = "MODERATOR";

/// Framing appended as the seed utterance of a titled conversation.
pub fn seed_text(title: &str) -> String {
    format!(
        "DEBATE TOPIC: \"{title}\".\n\
         GUIDELINES: Debate this topic in depth. Be direct and challenge each other. \
         Do not act as assistants; act as autonomous thinkers with your own personalities. \
         Seek consensus or expose contradictions."
    )
}

/// Persona base prompt plus the debate rules.
pub fn debate_system_prompt(persona: &Persona) -> String {
    format!(
        "{base}\n\n\
         SIMULATION CONTEXT:\n\
         You are debating autonomously with other AIs.\n\
         Your name is: {name}.\n\
         The current topic follows from the conversation history.\n\n\
         RULES:\n\
         1. Be concise (at most 3 paragraphs).\n\
         2. Respond directly to the previous arguments.\n\
         3. Keep your personality strong.\n\
         4. Do not repeat yourself.\n\
         5. Output only the words you speak. No stage directions, no actions between asterisks, \
         no narration in parentheses, no bracketed tags.\n\
         6. Never start with your own name or any speaker label.",
        base = persona.system_prompt.trim(),
        name = persona.name,
    )
}

/// Map stored history into chat messages from `speaker`'s point of view.
///
/// The speaker's own utterances become `assistant` turns. Everyone else
/// becomes a `user` turn prefixed with `[Display Name]: `; `names` maps
/// sender ids to display names and unknown ids are shown raw.
pub fn context_messages(
    history: &[Utterance],
    speaker_id: &str,
    names: &HashMap<String, String>,
) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|u| {
            if u.sender.is(speaker_id) {
                ChatMessage::assistant(u.content.clone())
            } else {
                let label = match &u.sender {
                    Sender::System => SYSTEM_LABEL,
                    Sender::Participant(id) => names.get(id).map(String::as_str).unwrap_or(id),
                };
                ChatMessage::user(format!("[{label}]: {}", u.content))
            }
        })
        .collect()
}
