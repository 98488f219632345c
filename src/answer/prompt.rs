//! Chat prompt construction for spoken questions.
//!
//! The answer is read aloud, so the built-in instruction asks for short,
//! plain sentences without markup.  A configured system prompt replaces it
//! entirely.

// ---------------------------------------------------------------------------
// System instruction
// ---------------------------------------------------------------------------

const SYSTEM_INSTRUCTION: &str = "\
You are a voice assistant answering a spoken question.
The question was transcribed automatically and may contain recognition errors;
answer what the speaker most plausibly asked.

Rules:
1. Answer in one to three short sentences.
2. Use plain text only: no markdown, lists, code, emoji or URLs.
3. Spell out symbols and abbreviations the way they would be spoken.
4. If you do not know the answer, say so briefly.";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds `(system_msg, user_msg)` pairs for chat-completion APIs.
///
/// # Example
/// ```rust
/// use voice_query::answer::PromptBuilder;
///
/// let builder = PromptBuilder::default();
/// let (system, user) = builder.build_chat("what is the weather");
/// assert!(system.contains("voice assistant"));
/// assert_eq!(user, "what is the weather");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    system_override: Option<String>,
}

impl PromptBuilder {
    /// Use `system_prompt` instead of the built-in instruction when it is
    /// `Some` and not blank.
    pub fn new(system_prompt: Option<&str>) -> Self {
        Self {
            system_override: system_prompt
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    pub fn system_prompt(&self) -> &str {
        self.system_override.as_deref().unwrap_or(SYSTEM_INSTRUCTION)
    }

    pub fn build_chat(&self, query: &str) -> (String, String) {
        (self.system_prompt().to_string(), query.trim().to_string())
    }
}
