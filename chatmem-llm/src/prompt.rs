//! Prompt templates for memory extraction.
//!
//! Templates use `{name}` placeholders filled by [`render_template`]. JSON
//! examples inside the templates use single braces and are left alone,
//! since only the known variable names are substituted.

use chatmem_core::extraction::{CharacterContext, ExtractionInput};

/// System prompt for extracting memories from one conversation exchange.
pub const CONVERSATION_EXTRACTION_SYSTEM: &str = r"You are the memory keeper for {character_name}, a roleplay character.
Character voice: {character_persona}

Your job is to read the latest exchange and record what it reveals about the USER, so that
{character_name} remembers them in future conversations.

RULES:
- Only record what the user said or confirmed. Never record the character's own lines as facts about the user.
- Read questions, exclamations and negations too: 'Are you free after I finish work at 7?' reveals a schedule.
- Reasonable inference is fine ('going to Japan next week!' -> plans a trip to Japan). Do not invent causes.
- Skip small talk, thanks, and bare acknowledgements.
- Prefer new information or information that contradicts what was known before.
- Write each memory as one short sentence in {character_name}'s own first-person voice,
  e.g. 'They told me they finish work at 7.'

MEMORY TYPES:
- fact: objective information (name, job, home, schedule, belongings)
- preference: likes, dislikes, values, opinions
- event: something the user lived through or plans to do
- emotion: a strong feeling the user clearly expressed
- relationship: how the user sees {character_name} or reacts to them

IMPORTANCE (1-10):
- 9-10: major life events, core values, long-term goals
- 7-8: job, regular schedule, important hobbies, recent impactful events
- 4-6: ordinary likes, daily activities, passing moods
- 1-3: trivia that will likely change soon
- 0: do not record";

/// User prompt for conversation extraction.
pub const CONVERSATION_EXTRACTION_USER: &str = r#"Latest exchange:
User: {user_message}
{character_name}: {character_reply}

Return ONLY this JSON in a ```json fenced block:
{"memories": [{"type": "fact|preference|event|emotion|relationship", "content": "...", "importance": 1-10, "tags": ["1-3 short keywords"]}], "summary": "one sentence on the most important NEW information, or empty"}

If nothing new was revealed, return {"memories": [], "summary": ""}."#;

/// System prompt for extracting initial memories from a character description.
pub const ONBOARDING_EXTRACTION_SYSTEM: &str = r"You are the memory keeper for {character_name}, a roleplay character.
Character voice: {character_persona}

You will read the character's setup description and record what it states about the USER.
In the description, {{user}} refers to the user and {{char}} refers to the character.

RULES:
- Only record information about the user, never about the character.
- Only record what is explicitly stated. Do not guess.
- Write each memory as one short sentence in {character_name}'s own first-person voice,
  e.g. 'We grew up on the same street.'
- If the description says nothing about the user, return an empty array.";

/// User prompt for onboarding extraction.
pub const ONBOARDING_EXTRACTION_USER: &str = r#"Character description:
{description}

Return ONLY a JSON array in a ```json fenced block:
[{"type": "fact|preference|event|emotion|relationship", "content": "...", "importance": 1-10, "tags": ["keyword"]}]

If there is nothing to record, return []."#;

/// Fill `{key}` placeholders in `template` in a single pass.
///
/// Unknown placeholders are left as-is, and substituted values are never
/// re-scanned.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let hit = vars
            .iter()
            .find(|(key, _)| tail.strip_prefix(*key).is_some_and(|after| after.starts_with('}')));
        match hit {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render the `(system, user)` prompt pair for an extraction input.
#[must_use]
pub fn extraction_prompts(character: &CharacterContext, input: &ExtractionInput) -> (String, String) {
    let name = if character.name.trim().is_empty() {
        "the character"
    } else {
        character.name.trim()
    };
    let persona = if character.persona.trim().is_empty() {
        "not specified"
    } else {
        character.persona.trim()
    };
    let identity = [("character_name", name), ("character_persona", persona)];

    match input {
        ExtractionInput::Conversation {
            user_message,
            character_reply,
        } => {
            let system = render_template(CONVERSATION_EXTRACTION_SYSTEM, &identity);
            let user = render_template(
                CONVERSATION_EXTRACTION_USER,
                &[
                    identity[0],
                    ("user_message", user_message.as_str()),
                    ("character_reply", character_reply.as_str()),
                ],
            );
            (system, user)
        }
        ExtractionInput::Onboarding { description } => {
            let system = render_template(ONBOARDING_EXTRACTION_SYSTEM, &identity);
            let user = render_template(ONBOARDING_EXTRACTION_USER, &[("description", description.as_str())]);
            (system, user)
        }
    }
}
