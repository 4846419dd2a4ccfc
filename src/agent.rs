use tracing::{debug, warn};

use crate::engine::{ContentBlock, EngineClient, Message, ToolDefinition};
use crate::error::Result;
use crate::tools::{ToolGateway, format_tool_result};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

const EXHAUSTED_PLACEHOLDER: &str = "Analysis incomplete due to iteration limit.";

/// The loop's control state. Terminal states are `Done` (the engine
/// finished on its own) and `Exhausted` (the iteration cap cut it off).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingResponse,
    DispatchingTools,
    Done,
    Exhausted,
}

#[derive(Debug)]
pub struct LoopOutcome {
    pub text: String,
    pub state: LoopState,
    pub turns: u32,
    pub tools_dispatched: u32,
}

/// Drives one prompt through the engine, dispatching tool calls between
/// turns, until the engine ends its turn or the iteration cap is hit.
pub struct AgentLoop<'a> {
    engine: &'a dyn EngineClient,
    gateway: &'a ToolGateway<'a>,
    system_prompt: &'a str,
    tools: Vec<ToolDefinition>,
}

impl<'a> AgentLoop<'a> {
    pub fn new(
        engine: &'a dyn EngineClient,
        gateway: &'a ToolGateway<'a>,
        system_prompt: &'a str,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            engine,
            gateway,
            system_prompt,
            tools,
        }
    }

    pub async fn run(&self, user_prompt: &str, max_iterations: u32) -> Result<LoopOutcome> {
        let mut messages = vec![Message::user_text(user_prompt)];
        let mut state = LoopState::AwaitingResponse;
        let mut turns = 0u32;
        let mut tools_dispatched = 0u32;
        let mut last_text = String::new();

        while state == LoopState::AwaitingResponse {
            if turns == max_iterations {
                state = LoopState::Exhausted;
                break;
            }
            turns += 1;

            let response = self
                .engine
                .complete(self.system_prompt, &self.tools, &messages)?;

            if response.is_end_turn() {
                state = LoopState::Done;
                last_text = response.text();
                break;
            }

            state = LoopState::DispatchingTools;
            last_text = response.text();

            let calls = response.tool_calls();
            debug!(turn = turns, calls = calls.len(), state = ?state, "dispatching tool calls");

            let mut tool_results = Vec::new();
            for (id, name, input) in calls {
                debug!(tool = name, turn = turns, "executing tool call");
                let result = self.gateway.execute(name, input).await;
                tool_results.push(ContentBlock::ToolResult {
                    tool_use_id: id.to_string(),
                    content: format_tool_result(&result),
                });
                tools_dispatched += 1;
            }

            messages.push(Message::assistant(response.content));
            messages.push(Message::tool_results(tool_results));
            state = LoopState::AwaitingResponse;
        }

        if state == LoopState::Exhausted {
            warn!(max_iterations, "agent loop hit iteration cap");
            if last_text.is_empty() {
                last_text = EXHAUSTED_PLACEHOLDER.to_string();
            }
        }

        Ok(LoopOutcome {
            text: last_text,
            state,
            turns,
            tools_dispatched,
        })
    }
}
