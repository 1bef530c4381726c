//! Prompt text for the decide step, the clarification re-prompt, and the
//! reflection pass.

use wizard_core::tool::ToolRegistry;

use crate::observation::Observation;

const SYSTEM_TEMPLATE: &str = r#"You are Weekend Wizard, a cheerful assistant that helps people plan great weekends.

You have access to these tools:
{tools}

## ReAct Protocol (follow this exactly)
Think step by step. For EVERY reply output ONLY a single valid JSON object, with no prose and no markdown fences.

To call a tool:
{"action": "<tool_name>", "args": {"<param>": <value>}}

To give your final answer:
{"action": "final", "answer": "<your friendly, well-formatted answer>"}

## Rules
- If the user mentions a city but no coordinates, call city_to_coords FIRST.
- For a full weekend plan: fetch get_weather, book_recs, random_joke AND random_dog.
- Your final answer must be warm, structured, and reference the fetched data directly
  (actual temperature, real book titles, the exact joke text, the real dog URL).
- Keep the final answer between 6 and 12 lines.
- Do NOT repeat a tool call with the same arguments. If a tool fails, try another or explain in the answer.
"#;

/// One line per tool: `  - name(param: type, opt?: type) : description`.
pub fn tool_lines(tools: &ToolRegistry) -> String {
    tools
        .tools()
        .iter()
        .map(|t| format!("  - {} : {}", t.signature(), t.description().trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The system prompt, with the registry's tools filled in.
pub fn system_prompt(tools: &ToolRegistry) -> String {
    SYSTEM_TEMPLATE.replace("{tools}", &tool_lines(tools))
}

/// Sent once after a reply that could not be interpreted.
pub fn clarification(reason: &str) -> String {
    format!(
        "Your last reply could not be read ({reason}). Reply again with ONLY one JSON object: \
         {{\"action\": \"<tool_name>\", \"args\": {{...}}}} to call a tool, or \
         {{\"action\": \"final\", \"answer\": \"...\"}} to answer."
    )
}

/// Extra guidance appended to an unknown-capability observation.
pub fn unknown_capability_hint(tools: &ToolRegistry) -> String {
    format!(
        "Available tools: {}. Use a valid tool or produce a final answer.",
        tools.names().join(", ")
    )
}

/// Extra guidance appended when a call is refused as a repeat.
pub const ALREADY_TRIED: &str =
    "This exact call already failed. Do not repeat it; try something else or give your final answer.";

pub const REFLECTION_SYSTEM: &str = "You are a quality reviewer for weekend plans. \
You receive the user's request, the data the assistant gathered, and its candidate answer. \
If the answer fully addresses the request and references the real data \
(temperature, book titles, joke text, dog URL, trivia question), reply with EXACTLY: looks good\n\
Otherwise reply with an improved version of the answer, and nothing else.";

/// The user turn for the reflection pass.
pub fn reflection_request(request: &str, candidate: &str, observations: &[Observation]) -> String {
    let mut out = format!("## Request\n{request}\n\n## Gathered data\n");
    if observations.is_empty() {
        out.push_str("(none)\n");
    }
    for obs in observations {
        out.push_str(&format!("- {}\n", obs.render()));
    }
    out.push_str(&format!("\n## Candidate answer\n{candidate}\n"));
    out
}
