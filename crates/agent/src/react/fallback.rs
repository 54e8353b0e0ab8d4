//! Deterministic fallbacks for when the model's output is unusable.
//!
//! [`keyword_decision`] picks the next step from the same pattern families
//! the decision engine uses; [`default_args`] fills tool arguments the
//! model left out. Together they keep a run useful even when every THINK
//! answer is garbage.

use super::memory::AgentMemory;
use super::thought::ParsedDecision;
use crate::decision::patterns::{normalize, words};
use crate::decision::{PatternScan, PatternScanner};
use chrono::{Duration, Utc};
use orquesta_tools::names;
use serde_json::{Map, Value};

const FALLBACK_TOOL_CONFIDENCE: f32 = 0.6;
const FALLBACK_RESPOND_CONFIDENCE: f32 = 0.5;
const DEFAULT_REMINDER_TIME: &str = "09:00";

fn edits_reminder(tool: &str) -> bool {
    tool == names::CANCEL_REMINDER || tool == names::UPDATE_REMINDER
}

/// The next step, decided from keywords and what the run already did.
///
/// A successful step normally ends the run, except a reminder listing made
/// on the way to a cancel or update: that edit still runs, with
/// [`default_args`] taking the id from the listing.
pub fn keyword_decision(scan: &PatternScan, memory: &AgentMemory) -> ParsedDecision {
    let next_tool = scan
        .suggested_tools
        .iter()
        .find(|tool| !memory.attempted(tool));

    if let Some(last) = memory.last().filter(|e| e.observation.success) {
        let listed_for_edit = last.action.tool_name() == Some(names::LIST_REMINDERS)
            && last.observation.data.is_some()
            && next_tool.is_some_and(|t| edits_reminder(t));
        if !listed_for_edit {
            return ParsedDecision::respond(None, FALLBACK_RESPOND_CONFIDENCE)
                .with_reasoning("keyword fallback: summarize the last result");
        }
    }

    match next_tool {
        Some(tool) => {
            let needs_listing = edits_reminder(tool)
                && memory.latest_data(names::LIST_REMINDERS).is_none()
                && !memory.attempted(names::LIST_REMINDERS);
            let tool = if needs_listing {
                names::LIST_REMINDERS
            } else {
                tool.as_str()
            };
            ParsedDecision::use_tool(tool, serde_json::json!({}), FALLBACK_TOOL_CONFIDENCE)
                .with_reasoning(format!("keyword fallback: {tool}"))
        }
        None => ParsedDecision::respond(None, FALLBACK_RESPOND_CONFIDENCE)
            .with_reasoning("keyword fallback: no tool applies"),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}

fn set_missing(args: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    let missing = args
        .get(key)
        .is_none_or(|v| v.is_null() || v.as_str().is_some_and(|s| s.trim().is_empty()));
    if missing && let Some(value) = value {
        args.insert(key.to_string(), value);
    }
}

/// Pick the reminder a message most likely refers to from a listing.
fn match_reminder(listing: &Value, message: &str) -> Option<String> {
    let pending: Vec<&Value> = listing
        .as_array()?
        .iter()
        .filter(|r| r["status"] == "pending")
        .collect();
    if let [only] = pending.as_slice() {
        return only["id"].as_str().map(String::from);
    }

    let normalized = normalize(message);
    let message_words = words(&normalized);
    pending
        .iter()
        .map(|r| {
            let title = normalize(r["title"].as_str().unwrap_or_default());
            let overlap = words(&title)
                .iter()
                .filter(|w| w.len() > 2 && message_words.contains(w))
                .count();
            (overlap, *r)
        })
        .filter(|(overlap, _)| *overlap > 0)
        .max_by_key(|(overlap, _)| *overlap)
        .and_then(|(_, r)| r["id"].as_str().map(String::from))
}

/// Fill arguments the model did not supply. Supplied values always win.
pub fn default_args(
    tool: &str,
    provided: Value,
    message: &str,
    scanner: &PatternScanner,
    memory: &AgentMemory,
) -> Value {
    let mut args = match provided {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    match tool {
        names::CREATE_PAYMENT_LINK => {
            set_missing(
                &mut args,
                "amount",
                scanner.extract_amount(message).map(Value::from),
            );
            set_missing(
                &mut args,
                "description",
                Some(Value::from(format!("Pago: {}", truncate(message, 60)))),
            );
        }
        names::SCHEDULE_REMINDER => {
            let tomorrow = (Utc::now() + Duration::days(1)).format("%Y-%m-%d").to_string();
            set_missing(&mut args, "title", Some(Value::from(truncate(message, 80))));
            set_missing(
                &mut args,
                "date",
                Some(Value::from(scanner.extract_date(message).unwrap_or(tomorrow))),
            );
            set_missing(
                &mut args,
                "time",
                Some(Value::from(
                    scanner
                        .extract_time(message)
                        .unwrap_or_else(|| DEFAULT_REMINDER_TIME.to_string()),
                )),
            );
            set_missing(
                &mut args,
                "email",
                scanner.extract_email(message).map(Value::from),
            );
        }
        names::UPDATE_REMINDER | names::CANCEL_REMINDER => {
            let id = memory
                .latest_data(names::LIST_REMINDERS)
                .and_then(|listing| match_reminder(listing, message));
            set_missing(&mut args, "id", id.map(Value::from));
            if tool == names::UPDATE_REMINDER {
                set_missing(
                    &mut args,
                    "date",
                    scanner.extract_date(message).map(Value::from),
                );
                set_missing(
                    &mut args,
                    "time",
                    scanner.extract_time(message).map(Value::from),
                );
            }
        }
        names::SAVE_CONTACT_INFO => {
            set_missing(
                &mut args,
                "email",
                scanner.extract_email(message).map(Value::from),
            );
            set_missing(
                &mut args,
                "phone",
                scanner.extract_phone(message).map(Value::from),
            );
            set_missing(&mut args, "notes", Some(Value::from(truncate(message, 200))));
        }
        names::GET_CHATBOT_STATS => {
            let normalized = normalize(message);
            let words = words(&normalized);
            let period = if words.contains(&"hoy") || words.contains(&"today") {
                "day"
            } else if words.contains(&"mes") || words.contains(&"month") {
                "month"
            } else {
                "week"
            };
            set_missing(&mut args, "period", Some(Value::from(period)));
        }
        _ => {}
    }

    Value::Object(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::memory::{Action, NextAction, Observation, Thought, ThoughtSource};

    fn scanner() -> PatternScanner {
        PatternScanner::new().unwrap()
    }

    fn record_tool(memory: &mut AgentMemory, tool: &str, success: bool, data: Option<Value>) {
        memory.record(
            Thought {
                reasoning: String::new(),
                confidence: 0.8,
                next: NextAction::UseTool,
                source: ThoughtSource::Model,
            },
            Action::ToolCall {
                tool: tool.into(),
                input: serde_json::json!({}),
            },
            Observation {
                success,
                content: "x".into(),
                is_complete: false,
                data,
            },
        );
    }

    #[test]
    fn picks_first_suggested_tool() {
        let scan = scanner().scan("Genera un link de pago por $500");
        let decision = keyword_decision(&scan, &AgentMemory::new());
        assert_eq!(decision.action, NextAction::UseTool);
        assert_eq!(decision.tool_name.as_deref(), Some(names::CREATE_PAYMENT_LINK));
    }

    #[test]
    fn responds_after_success_or_without_tools() {
        let scan = scanner().scan("¿Cómo estás?");
        assert_eq!(
            keyword_decision(&scan, &AgentMemory::new()).action,
            NextAction::Respond
        );

        let scan = scanner().scan("Genera un link de pago por $500");
        let mut memory = AgentMemory::new();
        record_tool(&mut memory, names::CREATE_PAYMENT_LINK, true, None);
        assert_eq!(keyword_decision(&scan, &memory).action, NextAction::Respond);
    }

    #[test]
    fn skips_failed_tools() {
        let scan = scanner().scan("Genera un link de pago por $500");
        let mut memory = AgentMemory::new();
        record_tool(&mut memory, names::CREATE_PAYMENT_LINK, false, None);
        let decision = keyword_decision(&scan, &memory);
        assert_eq!(decision.action, NextAction::Respond);
    }

    #[test]
    fn cancel_lists_first() {
        let scan = scanner().scan("Cancela mi cita de mañana");
        let decision = keyword_decision(&scan, &AgentMemory::new());
        assert_eq!(decision.tool_name.as_deref(), Some(names::LIST_REMINDERS));
    }

    #[test]
    fn cancel_follows_a_listing() {
        let scan = scanner().scan("Cancela mi cita de llamar a Juan");
        let mut memory = AgentMemory::new();
        record_tool(
            &mut memory,
            names::LIST_REMINDERS,
            true,
            Some(serde_json::json!([{"id": "r1", "title": "Llamar a Juan", "status": "pending"}])),
        );
        let decision = keyword_decision(&scan, &memory);
        assert_eq!(decision.tool_name.as_deref(), Some(names::CANCEL_REMINDER));

        record_tool(&mut memory, names::CANCEL_REMINDER, true, None);
        assert_eq!(keyword_decision(&scan, &memory).action, NextAction::Respond);
    }

    #[test]
    fn empty_listing_ends_the_edit() {
        let scan = scanner().scan("Cancela mi cita de llamar a Juan");
        let mut memory = AgentMemory::new();
        record_tool(&mut memory, names::LIST_REMINDERS, true, None);
        assert_eq!(keyword_decision(&scan, &memory).action, NextAction::Respond);
    }

    #[test]
    fn payment_defaults() {
        let args = default_args(
            names::CREATE_PAYMENT_LINK,
            serde_json::json!({"description": "Plan anual"}),
            "Cóbrale $1,250.50 por el plan anual",
            &scanner(),
            &AgentMemory::new(),
        );
        assert_eq!(args["amount"], 1250.5);
        assert_eq!(args["description"], "Plan anual");
    }

    #[test]
    fn reminder_defaults() {
        let args = default_args(
            names::SCHEDULE_REMINDER,
            Value::Null,
            "Recuérdame llamar a Juan el 2030-01-15 a las 16:45",
            &scanner(),
            &AgentMemory::new(),
        );
        assert_eq!(args["date"], "2030-01-15");
        assert_eq!(args["time"], "16:45");
        assert!(args["title"].as_str().unwrap().contains("llamar a Juan"));

        let args = default_args(
            names::SCHEDULE_REMINDER,
            serde_json::json!({"time": ""}),
            "recuérdame algo",
            &scanner(),
            &AgentMemory::new(),
        );
        assert_eq!(args["time"], DEFAULT_REMINDER_TIME);
    }

    #[test]
    fn cancel_picks_reminder_from_listing() {
        let mut memory = AgentMemory::new();
        record_tool(
            &mut memory,
            names::LIST_REMINDERS,
            true,
            Some(serde_json::json!([
                {"id": "r1", "title": "Llamar a Juan", "status": "pending"},
                {"id": "r2", "title": "Pagar renta", "status": "pending"},
                {"id": "r3", "title": "Renta vieja", "status": "cancelled"},
            ])),
        );
        let args = default_args(
            names::CANCEL_REMINDER,
            serde_json::json!({}),
            "cancela lo de la renta",
            &scanner(),
            &memory,
        );
        assert_eq!(args["id"], "r2");

        let args = default_args(
            names::CANCEL_REMINDER,
            serde_json::json!({}),
            "cancela eso",
            &scanner(),
            &memory,
        );
        assert!(args.get("id").is_none());
    }

    #[test]
    fn stats_period_from_wording() {
        let args = default_args(
            names::GET_CHATBOT_STATS,
            serde_json::json!({}),
            "¿cuántas conversaciones tuve este mes?",
            &scanner(),
            &AgentMemory::new(),
        );
        assert_eq!(args["period"], "month");
    }
}
