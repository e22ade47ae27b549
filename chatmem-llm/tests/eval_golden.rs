//! Extraction Prompt Evaluation — Golden Test Set.
//!
//! A curated set of extraction inputs and the properties their rendered
//! prompts must have, plus golden model replies that the core parser must
//! turn into the expected memories.
//!
//! ## Usage
//!
//! - **Offline eval:** `cargo test -p chatmem-llm --test eval_golden` checks
//!   prompt rendering and reply parsing.
//! - **Online eval (requires Ollama):** set `CHATMEM_EVAL_LLM=1` to send the
//!   golden inputs to the configured model and check that each reply parses.

use chatmem_core::config::LlmConfig;
use chatmem_core::extraction::{
    self, CharacterContext, ExtractionAdapter, ExtractionInput, ExtractionRequest, ParsedReply,
};
use chatmem_core::{MemoryKind, SubjectId};
use chatmem_llm::{LlmExtractor, prompt};

/// A golden test case for prompt rendering.
struct GoldenCase {
    /// Human-readable name for the test case.
    name: &'static str,
    character: CharacterContext,
    input: ExtractionInput,
    /// Strings that MUST appear in the rendered prompts.
    prompt_must_contain: Vec<&'static str>,
    /// Strings that MUST NOT appear in the rendered prompts.
    prompt_must_not_contain: Vec<&'static str>,
}

fn conversation(user: &str, reply: &str) -> ExtractionInput {
    ExtractionInput::Conversation {
        user_message: user.to_string(),
        character_reply: reply.to_string(),
    }
}

fn onboarding(description: &str) -> ExtractionInput {
    ExtractionInput::Onboarding {
        description: description.to_string(),
    }
}

fn golden_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            name: "schedule_in_a_question",
            character: CharacterContext::new("Kai", "laid-back barista"),
            input: conversation("Are you free after I get off work at 7?", "Always, for you."),
            prompt_must_contain: vec!["Kai", "get off work at 7", "Always, for you.", "schedule"],
            prompt_must_not_contain: vec!["{user_message}", "{character_reply}", "{character_name}"],
        },
        GoldenCase {
            name: "negated_preference",
            character: CharacterContext::new("Luna", "shy librarian"),
            input: conversation("I really can't stand spicy food!", "Then no chili tonight."),
            prompt_must_contain: vec!["Luna", "spicy food", "preference", "importance"],
            prompt_must_not_contain: vec!["{character_persona}"],
        },
        GoldenCase {
            name: "small_talk",
            character: CharacterContext::new("Kai", "laid-back barista"),
            input: conversation("thanks!", "Anytime."),
            prompt_must_contain: vec!["small talk", "\"memories\": []"],
            prompt_must_not_contain: vec!["{user_message}"],
        },
        GoldenCase {
            name: "travel_plan",
            character: CharacterContext::new("Mei", "energetic travel vlogger"),
            input: conversation("Going to Japan next week!!", "Bring me back some matcha!"),
            prompt_must_contain: vec!["Japan next week", "event", "energetic travel vlogger"],
            prompt_must_not_contain: vec![],
        },
        GoldenCase {
            name: "relationship_signal",
            character: CharacterContext::new("Kai", "laid-back barista"),
            input: conversation("You always know how to cheer me up.", "That's my job."),
            prompt_must_contain: vec!["relationship", "how the user sees Kai"],
            prompt_must_not_contain: vec![],
        },
        GoldenCase {
            name: "nameless_character",
            character: CharacterContext::default(),
            input: conversation("My sister just got married.", "Congratulations!"),
            prompt_must_contain: vec!["the character", "not specified", "sister just got married"],
            prompt_must_not_contain: vec!["{character_name}"],
        },
        GoldenCase {
            name: "onboarding_childhood_friends",
            character: CharacterContext::new("Luna", "shy librarian"),
            input: onboarding("{{char}} and {{user}} grew up on the same street. {{user}} works as a nurse."),
            prompt_must_contain: vec!["{{user}} works as a nurse", "never about the character", "[]"],
            prompt_must_not_contain: vec!["{description}"],
        },
        GoldenCase {
            name: "onboarding_without_user_details",
            character: CharacterContext::new("Rex", "grumpy wizard"),
            input: onboarding("{{char}} is a wizard who lives in a tower."),
            prompt_must_contain: vec!["wizard who lives in a tower", "Do not guess"],
            prompt_must_not_contain: vec!["{character_persona}"],
        },
        GoldenCase {
            name: "unicode_conversation",
            character: CharacterContext::new("小雨", "温柔的猫娘"),
            input: conversation("我最喜欢下雨天了", "那我们一起听雨吧"),
            prompt_must_contain: vec!["小雨", "我最喜欢下雨天了", "温柔的猫娘"],
            prompt_must_not_contain: vec![],
        },
        GoldenCase {
            name: "braces_in_user_text",
            character: CharacterContext::new("Kai", "laid-back barista"),
            input: conversation("my password hint is {character_reply}", "I won't peek."),
            prompt_must_contain: vec!["my password hint is {character_reply}", "I won't peek."],
            prompt_must_not_contain: vec![],
        },
    ]
}

#[test]
fn golden_prompts_render_without_unresolved_vars() {
    for case in &golden_cases() {
        let (system, user) = prompt::extraction_prompts(&case.character, &case.input);
        let rendered = format!("{system}\n\n{user}");

        for needle in &case.prompt_must_contain {
            assert!(
                rendered.contains(needle),
                "Golden case '{}': rendered prompt must contain '{}' but doesn't.\nRendered:\n{}",
                case.name,
                needle,
                rendered
            );
        }
        for needle in &case.prompt_must_not_contain {
            assert!(
                !rendered.contains(needle),
                "Golden case '{}': rendered prompt must NOT contain '{}' but does.",
                case.name,
                needle
            );
        }
    }
}

#[test]
fn golden_set_has_minimum_coverage() {
    let cases = golden_cases();
    assert!(cases.len() >= 10, "Golden set must have at least 10 cases, got {}", cases.len());
}

#[test]
fn all_user_prompts_request_json() {
    for (name, template) in [
        ("conversation", prompt::CONVERSATION_EXTRACTION_USER),
        ("onboarding", prompt::ONBOARDING_EXTRACTION_USER),
    ] {
        assert!(template.contains("```json"), "User prompt '{name}' must ask for a fenced JSON block");
    }
}

#[test]
fn golden_replies_parse_into_expected_memories() {
    let cases: [(&str, &[(MemoryKind, &str)]); 4] = [
        (
            "```json\n{\"memories\": [{\"type\": \"fact\", \"content\": \"finishes work at 7pm\", \"importance\": 7, \"tags\": [\"work\"]}], \"summary\": \"Gets off work at 7.\"}\n```",
            &[(MemoryKind::Fact, "finishes work at 7pm")],
        ),
        (
            "Sure!\n```json\n{\"memories\": [{\"type\": \"preference\", \"content\": \"dislikes spicy food\", \"importance\": 5}], \"summary\": \"\"}\n```\nLet me know if you need more.",
            &[(MemoryKind::Preference, "dislikes spicy food")],
        ),
        (
            "```json\n[{\"type\": \"relationship\", \"content\": \"grew up next door to me\", \"importance\": 8, \"tags\": [\"childhood\"]}, {\"type\": \"fact\", \"content\": \"works as a nurse\", \"importance\": 7}]\n```",
            &[
                (MemoryKind::Relationship, "grew up next door to me"),
                (MemoryKind::Fact, "works as a nurse"),
            ],
        ),
        (
            "{\"memories\": [{\"type\": \"event\", \"content\": \"is travelling to Japan next week\", \"importance\": 6}]}",
            &[(MemoryKind::Event, "is travelling to Japan next week")],
        ),
    ];

    for (reply, expected) in cases {
        match extraction::parse_reply(reply) {
            ParsedReply::Proposals { proposals, rejected, .. } => {
                assert_eq!(rejected, 0, "reply: {reply}");
                let got: Vec<_> = proposals.iter().map(|p| (p.kind, p.content.as_str())).collect();
                assert_eq!(got, expected.to_vec(), "reply: {reply}");
            }
            other => panic!("golden reply did not parse: {other:?}\n{reply}"),
        }
    }
}

#[tokio::test]
async fn online_golden_replies_parse() {
    if std::env::var("CHATMEM_EVAL_LLM").is_err() {
        return;
    }
    let extractor = LlmExtractor::from_config(&LlmConfig::default()).expect("config");
    for case in golden_cases() {
        let request = ExtractionRequest {
            subject: SubjectId::new("eval"),
            character: case.character,
            input: case.input,
        };
        let reply = extractor.extract(&request).await.expect("LLM reachable");
        assert!(
            !matches!(extraction::parse_reply(&reply), ParsedReply::ParseError(_)),
            "Golden case '{}' produced an unparseable reply:\n{reply}",
            case.name
        );
    }
}
