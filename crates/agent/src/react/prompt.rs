//! Prompt assembly for THINK, answer and conversational calls.

use super::memory::AgentMemory;
use orquesta_core::collaborator::RetrievedChunk;
use orquesta_core::message::Message;
use orquesta_core::provider::ToolSpec;
use orquesta_core::tenant::PlanTier;

const DEFAULT_PERSONA: &str =
    "Eres un asistente de atención al cliente. Responde en el idioma del usuario, de forma breve y clara.";

const DECISION_FORMAT: &str = r#"Responde SOLO con un objeto JSON:
{"action": "use_tool" | "respond", "tool_name": "<nombre o null>", "args": {...}, "response": "<texto final o null>", "confidence": 0.0-1.0, "reasoning": "<breve>"}
Usa "respond" cuando ya tengas lo necesario para contestar."#;

/// Everything a THINK prompt is built from.
pub struct ThinkInput<'a> {
    pub message: &'a str,
    pub tools: &'a [ToolSpec],
    pub memory: &'a AgentMemory,
    pub knowledge: &'a [RetrievedChunk],
    pub plan: PlanTier,
    /// 1-based
    pub iteration: u32,
    pub max_iterations: u32,
    pub system_prompt: Option<&'a str>,
}

fn persona(system_prompt: Option<&str>) -> &str {
    system_prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PERSONA)
}

fn render_knowledge(knowledge: &[RetrievedChunk]) -> String {
    if knowledge.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n## Información del negocio\n");
    for (i, chunk) in knowledge.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, chunk.content.trim()));
    }
    out
}

fn render_tools(tools: &[ToolSpec]) -> String {
    if tools.is_empty() {
        return "No hay herramientas disponibles.".into();
    }
    tools
        .iter()
        .map(|t| format!("- {}: {}\n  parámetros: {}", t.name, t.description, t.parameters))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The structured-decision prompt for one iteration.
pub fn build_think_prompt(input: &ThinkInput<'_>) -> Vec<Message> {
    let system = format!(
        "{persona}{knowledge}\n\n## Herramientas (plan {plan})\n{tools}\n\n{format}",
        persona = persona(input.system_prompt),
        knowledge = render_knowledge(input.knowledge),
        plan = input.plan,
        tools = render_tools(input.tools),
        format = DECISION_FORMAT,
    );

    let mut user = format!("Mensaje del usuario: {}\n", input.message);
    if !input.memory.is_empty() {
        user.push_str("\n## Pasos anteriores\n");
        user.push_str(&input.memory.render());
    }
    user.push_str(&format!(
        "\nIteración {} de {}. ¿Cuál es el siguiente paso?",
        input.iteration, input.max_iterations
    ));

    vec![Message::system(system), Message::user(user)]
}

/// Final-answer prompt written from what the run observed.
pub fn build_answer_prompt(
    message: &str,
    memory: &AgentMemory,
    knowledge: &[RetrievedChunk],
    system_prompt: Option<&str>,
) -> Vec<Message> {
    let system = format!(
        "{}{}\n\nRedacta la respuesta final para el usuario usando solo los resultados obtenidos. No inventes datos.",
        persona(system_prompt),
        render_knowledge(knowledge),
    );
    let mut user = format!("Mensaje del usuario: {message}\n");
    if !memory.is_empty() {
        user.push_str("\n## Resultados\n");
        user.push_str(&memory.render());
    }
    vec![Message::system(system), Message::user(user)]
}

/// Plain conversational prompt for messages that need no tools.
pub fn build_conversation_prompt(
    message: &str,
    knowledge: &[RetrievedChunk],
    system_prompt: Option<&str>,
) -> Vec<Message> {
    vec![
        Message::system(format!(
            "{}{}",
            persona(system_prompt),
            render_knowledge(knowledge)
        )),
        Message::user(message),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::memory::{Action, NextAction, Observation, Thought, ThoughtSource};
    use orquesta_core::message::Role;

    fn chunk(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: text.into(),
            score: 0.9,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn think_prompt_carries_tools_knowledge_and_trace() {
        let tools = vec![ToolSpec {
            name: "create_payment_link".into(),
            description: "Crea un link de pago".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let mut memory = AgentMemory::new();
        memory.record(
            Thought {
                reasoning: "cobrar".into(),
                confidence: 0.9,
                next: NextAction::UseTool,
                source: ThoughtSource::Model,
            },
            Action::ToolCall {
                tool: "create_payment_link".into(),
                input: serde_json::json!({"amount": 500}),
            },
            Observation {
                success: false,
                content: "Falta descripción".into(),
                is_complete: false,
                data: None,
            },
        );
        let knowledge = [chunk("Horario: 9 a 18 h")];
        let messages = build_think_prompt(&ThinkInput {
            message: "Cóbrale $500",
            tools: &tools,
            memory: &memory,
            knowledge: &knowledge,
            plan: PlanTier::Pro,
            iteration: 2,
            max_iterations: 3,
            system_prompt: None,
        });

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("create_payment_link"));
        assert!(messages[0].content.contains("Horario: 9 a 18 h"));
        assert!(messages[0].content.contains("PRO"));
        assert!(messages[1].content.contains("Falta descripción"));
        assert!(messages[1].content.contains("Iteración 2 de 3"));
    }

    #[test]
    fn persona_override() {
        let messages = build_conversation_prompt("hola", &[], Some("Eres Lupita, de la Panadería"));
        assert!(messages[0].content.starts_with("Eres Lupita"));
        let messages = build_conversation_prompt("hola", &[], Some("  "));
        assert!(messages[0].content.starts_with(DEFAULT_PERSONA));
        assert_eq!(messages[1].content, "hola");
    }
}
