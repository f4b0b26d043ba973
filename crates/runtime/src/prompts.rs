//! System-message resolution.
//!
//! The agent's governing instruction text comes from a two-level
//! configuration table — has-claim vs no-claim on the outside, language
//! on the inside — with compiled-in defaults behind it. Resolution can
//! never fail: a missing table entry falls back to the built-in
//! instruction, and a malformed template is delivered verbatim rather
//! than aborting the session. The conversation must always start.

use sg_domain::config::PromptsConfig;
use sg_domain::error::{Error, Result};

/// Language used when the requested one has no entry anywhere.
pub const DEFAULT_LANGUAGE: &str = "english";

/// Built-in greeting emitted as the first assistant turn.
pub const DEFAULT_OPENING: &str = "Hi, my name is Diotima. I am a street epistemologist \
     that can help you examine your beliefs. What is your name?";

/// Built-in instruction for sessions where the agent elicits a belief.
pub const DEFAULT_INSTRUCTION: &str = "Your name is Diotima. You are a street epistemologist. \
     You are friendly, curious and humble, with an easy, concise, conversational style. \
     Have a conversation with me that helps me examine one of my beliefs. \
     First ask me my name, then which belief I want to investigate, then how confident \
     I am in it on a scale from 1-10, asking questions one by one and never proceeding \
     before I answer. Gently help me see where my belief might be wrong or unjustified. \
     Once the conversation has reached saturation, summarize it, ask me again how \
     confident I am now, thank me, and say goodbye. Literally use the word goodbye. \
     Do not introduce new facts, and don't be preachy.";

/// Built-in instruction for sessions arriving with a pre-supplied claim.
pub const DEFAULT_INSTRUCTION_WITH_CLAIM: &str = "Your name is Diotima. You are a street \
     epistemologist. You are friendly, curious and humble, with an easy, concise, \
     conversational style. I have told you that I believe: {claim}. My confidence in \
     this belief is {credence} on a scale from 1-10. Have a conversation with me that \
     helps me examine the epistemology of this belief, asking questions one by one and \
     never proceeding before I answer. Once the conversation has reached saturation, \
     summarize it, ask me again how confident I am now, thank me, and say goodbye. \
     Literally use the word goodbye. Do not introduce new facts, and don't be preachy.";

/// Resolves instruction and opening texts for one session.
///
/// Side-effect-free; the controller calls it once at session start and
/// memoizes the result on the session document.
pub struct SystemMessageResolver {
    prompts: PromptsConfig,
}

impl SystemMessageResolver {
    pub fn new(prompts: PromptsConfig) -> Self {
        Self { prompts }
    }

    /// Resolve the governing instruction text.
    ///
    /// With no claim, the no-claim template is returned verbatim. With a
    /// claim, `{claim}` and `{credence}` are substituted into the
    /// with-claim template; a template that fails substitution is
    /// returned unsubstituted.
    pub fn resolve(&self, claim: Option<&str>, credence: i64, language: &str) -> String {
        match claim {
            None => self
                .lookup(&self.prompts.without_claim, language)
                .unwrap_or(DEFAULT_INSTRUCTION)
                .to_owned(),
            Some(claim) => {
                let template = self
                    .lookup(&self.prompts.with_claim, language)
                    .unwrap_or(DEFAULT_INSTRUCTION_WITH_CLAIM);
                match substitute(template, claim, credence) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(
                            language = language,
                            error = %e,
                            "template substitution failed, delivering template verbatim"
                        );
                        template.to_owned()
                    }
                }
            }
        }
    }

    /// The localized canned greeting for the first assistant turn.
    pub fn opening_message(&self, language: &str) -> String {
        self.lookup(&self.prompts.openings, language)
            .unwrap_or(DEFAULT_OPENING)
            .to_owned()
    }

    fn lookup<'a>(
        &self,
        table: &'a std::collections::HashMap<String, String>,
        language: &str,
    ) -> Option<&'a str> {
        table
            .get(&language.to_lowercase())
            .or_else(|| table.get(DEFAULT_LANGUAGE))
            .map(String::as_str)
    }
}

/// Substitute `{claim}` and `{credence}` placeholders.
///
/// Any other placeholder, or an unterminated one, is a substitution
/// failure — the caller falls back to the raw template.
fn substitute(template: &str, claim: &str, credence: i64) -> Result<String> {
    let mut out = String::with_capacity(template.len() + claim.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| Error::Config("unterminated placeholder".into()))?;
        match &after[..end] {
            "claim" => out.push_str(claim),
            "credence" => out.push_str(&credence.to_string()),
            other => {
                return Err(Error::Config(format!("unknown placeholder: {{{other}}}")));
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
