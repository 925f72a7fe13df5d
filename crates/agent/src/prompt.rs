//! System instructions for the two reasoning policies.

use ponder_config::ReasoningPolicy;
use ponder_core::tool::ToolRegistry;

/// Build the system prompt: format contract plus the tool catalogue.
pub fn system_prompt(tools: &ToolRegistry, policy: ReasoningPolicy) -> String {
    let catalogue = tools
        .catalogue()
        .lines()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n");

    match policy {
        ReasoningPolicy::Dense => format!(
            "You are an intelligent reasoning agent that follows the ReAct format exactly.
Your process must alternate strictly between Thought, Action, and Observation.
At each step, output ONLY one Thought and one Action, then stop and wait for the Observation.
Use the 'finish' tool with your final answer when the task is complete.

Available tools:
{catalogue}

Format MUST be:
Thought: I need to [reasoning step]
Action: tool_name[argument]

Observation: [Tool result]"
        ),
        ReasoningPolicy::Sparse => format!(
            "You are an intelligent agent that solves tasks by reasoning and acting.
At each step you can reason (Thought), act (Action), or do both.
Thoughts are optional: only write one when you need to plan or reconsider.
After an Action, stop and wait for the Observation.
Use the 'finish' tool with your final answer when the task is complete.

Available tools:
{catalogue}

Valid step formats:
Thought: [reasoning]
Action: tool_name[argument]

OR

Action: tool_name[argument]

OR

Thought: [reasoning]"
        ),
    }
}
