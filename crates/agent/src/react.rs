//! ReAct pattern: Thought → Action → Observation loop.
//!
//! The model reasons in plain text and names at most one action per step
//! using the `name[argument]` grammar. The loop parses each response, guards
//! against repeated actions, dispatches the action, and feeds the
//! observation back until the model calls `finish` or a fatal condition
//! stops the run.
//!
//! # Event order
//!
//! Each iteration emits, in order:
//! - `info` announcing `Iteration i/N`
//! - `reasoning`, when the response carried a thought
//! - either `final_answer`, or `action_proposed` then `observation`
//!
//! A run ends with exactly one `final_answer` or one `error`, and nothing
//! follows it.

use crate::dispatcher::{Dispatcher, decode_final_answer};
use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::loop_guard::{ActionSignature, LoopGuard, Verdict};
use crate::parser;
use crate::prompt;
use futures::Stream;
use ponder_config::{
    AgentSettings, AppConfig, HistoryRetention, ReasoningPolicy, RepairStrategy, ToolErrorPolicy,
};
use ponder_core::message::{Conversation, Turn};
use ponder_core::provider::{Provider, ProviderRequest};
use ponder_core::tool::ToolRegistry;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const REFORMAT_REQUEST: &str = "Your last response did not follow the required format. \
Reply again with exactly one Thought and one Action:\nThought: [reasoning]\nAction: tool_name[argument]";

/// A configured ReAct agent. Cheap to clone; every run gets its own state.
#[derive(Clone)]
pub struct ReactAgent {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    settings: AgentSettings,
}

impl ReactAgent {
    /// Create an agent with default loop settings.
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            settings: AgentSettings::default(),
        }
    }

    /// Create an agent from the loaded configuration.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, tools, model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_settings(config.agent.clone())
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the iteration budget. Reprompts do not count against it.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.settings.max_iterations = max;
        self
    }

    pub fn with_reasoning(mut self, policy: ReasoningPolicy) -> Self {
        self.settings.reasoning = policy;
        self
    }

    /// Set how many recent actions the loop guard remembers.
    pub fn with_loop_window(mut self, window: usize) -> Self {
        self.settings.loop_window = window;
        self
    }

    pub fn with_history(mut self, history: HistoryRetention) -> Self {
        self.settings.history = history;
        self
    }

    pub fn with_repair(mut self, repair: RepairStrategy) -> Self {
        self.settings.repair = repair;
        self
    }

    /// Choose whether tool failures end the run or become observations,
    /// and how many observed failures a run tolerates.
    pub fn with_tool_errors(mut self, policy: ToolErrorPolicy, max_failures: usize) -> Self {
        self.settings.tool_errors = policy;
        self.settings.max_tool_failures = max_failures;
        self
    }

    /// Concatenate streamed deltas instead of making one completion call.
    pub fn with_stream_model(mut self, stream: bool) -> Self {
        self.settings.stream_model = stream;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.settings.stop = stop;
        self
    }

    /// Replace the generated system prompt verbatim.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.settings.system_prompt = Some(prompt.into());
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn system_prompt(&self) -> String {
        match &self.settings.system_prompt {
            Some(custom) => custom.clone(),
            None => prompt::system_prompt(&self.tools, self.settings.reasoning),
        }
    }

    /// Start a fresh run for `query`.
    pub fn start(&self, query: &str) -> AgentRun {
        self.resume(Conversation::new(), query)
    }

    /// Continue an earlier conversation with a new user query.
    ///
    /// The loop guard and failure count start fresh.
    pub fn resume(&self, mut conversation: Conversation, query: &str) -> AgentRun {
        if conversation.is_empty() {
            conversation.push(Turn::system(self.system_prompt()));
        }
        conversation.push(Turn::user(query));

        info!(
            conversation_id = %conversation.id,
            model = %self.model,
            policy = %self.settings.reasoning,
            max_iterations = self.settings.max_iterations,
            "Starting ReAct run"
        );
        AgentRun::new(self.clone(), conversation)
    }

    /// Run `query` as a lazily driven event stream.
    pub fn stream(&self, query: &str) -> impl Stream<Item = AgentEvent> + Send + 'static {
        self.start(query).into_stream()
    }

    /// Run `query` on a spawned task and deliver events over a channel.
    ///
    /// Dropping the receiver stops the run, including any in-flight model
    /// call or tool.
    pub fn spawn_stream(&self, query: &str) -> mpsc::Receiver<AgentEvent> {
        let mut run = self.start(query);
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Event receiver dropped, stopping run");
                        break;
                    }
                    event = run.next_event() => event,
                };
                let Some(event) = event else { break };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    /// Run `query` to completion and return the final answer.
    pub async fn invoke(&self, query: &str) -> Result<String, AgentError> {
        self.start(query).into_answer().await
    }

    /// Blocking form of [`invoke`](Self::invoke).
    ///
    /// Builds its own runtime, so it must not be called from async code.
    pub fn invoke_blocking(&self, query: &str) -> Result<String, AgentError> {
        blocking_runtime()?.block_on(self.invoke(query))
    }

    /// Blocking form of [`stream`](Self::stream): an iterator of events.
    pub fn stream_blocking(&self, query: &str) -> Result<BlockingEvents, AgentError> {
        Ok(BlockingEvents {
            runtime: blocking_runtime()?,
            run: self.start(query),
        })
    }
}

fn blocking_runtime() -> Result<tokio::runtime::Runtime, AgentError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AgentError::Runtime(e.to_string()))
}

// ── Run state ──────────────────────────────────────────────────────────────

enum Phase {
    /// Announce the next iteration, or stop if the budget is spent
    Begin,
    /// Ask the model for the next step
    Call,
    /// Run the action proposed by the last response
    Act(PendingAction),
    Done,
}

struct PendingAction {
    name: String,
    argument: String,
    response: String,
    reasoned: bool,
}

/// How the loop continues after reading a response.
enum Next {
    Settled,
    Reprompt(String),
}

/// One in-progress ReAct run.
///
/// Drive it with [`next_event`](Self::next_event) until it returns `None`.
/// Nothing happens between calls, so a consumer that stops pulling stops
/// the run.
pub struct AgentRun {
    agent: ReactAgent,
    conversation: Conversation,
    dispatcher: Dispatcher,
    guard: LoopGuard,
    iteration: usize,
    tool_failures: usize,
    pending: VecDeque<AgentEvent>,
    phase: Phase,
    answer: Option<String>,
    failure: Option<AgentError>,
}

impl AgentRun {
    fn new(agent: ReactAgent, conversation: Conversation) -> Self {
        Self {
            dispatcher: Dispatcher::new(agent.tools.clone()),
            guard: LoopGuard::new(agent.settings.loop_window),
            agent,
            conversation,
            iteration: 0,
            tool_failures: 0,
            pending: VecDeque::new(),
            phase: Phase::Begin,
            answer: None,
            failure: None,
        }
    }

    /// Produce the next event, or `None` once the run has ended.
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,
                Phase::Begin => self.begin(),
                Phase::Call => self.call().await,
                Phase::Act(action) => self.act(action).await,
            }
        }
    }

    /// Drive the run to its end and return the answer or the fatal error.
    pub async fn into_answer(mut self) -> Result<String, AgentError> {
        while self.next_event().await.is_some() {}
        match (self.answer, self.failure) {
            (Some(answer), _) => Ok(answer),
            (None, Some(err)) => Err(err),
            (None, None) => Err(AgentError::IterationsExhausted {
                budget: self.agent.settings.max_iterations,
            }),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = AgentEvent> + Send + 'static {
        futures::stream::unfold(self, |mut run| async move {
            run.next_event().await.map(|event| (event, run))
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Hand back the conversation, e.g. to [`ReactAgent::resume`] it later.
    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn failure(&self) -> Option<&AgentError> {
        self.failure.as_ref()
    }

    fn begin(&mut self) {
        let budget = self.agent.settings.max_iterations;
        if self.iteration >= budget {
            self.fail(AgentError::IterationsExhausted { budget });
            return;
        }
        self.iteration += 1;
        debug!(iteration = self.iteration, budget, "ReAct iteration");
        self.pending
            .push_back(AgentEvent::info(format!("Iteration {}/{}", self.iteration, budget)));
        self.phase = Phase::Call;
    }

    async fn call(&mut self) {
        let mut reprompted = false;
        loop {
            let response = match self.complete().await {
                Ok(text) => text,
                Err(e) => return self.fail(e),
            };
            match self.read(response, reprompted) {
                Next::Settled => return,
                Next::Reprompt(response) => {
                    reprompted = true;
                    self.pending.push_back(AgentEvent::info(
                        "Response did not follow the format, asking the model to reformat",
                    ));
                    self.conversation.push(Turn::model(response));
                    self.conversation.push(Turn::user(REFORMAT_REQUEST));
                }
            }
        }
    }

    async fn complete(&self) -> Result<String, AgentError> {
        let settings = &self.agent.settings;
        let request = ProviderRequest {
            model: self.agent.model.clone(),
            turns: self.conversation.turns().to_vec(),
            temperature: self.agent.temperature,
            max_tokens: self.agent.max_tokens,
            stream: settings.stream_model,
            stop: settings.stop.clone(),
        };

        if !settings.stream_model {
            return Ok(self.agent.provider.complete(request).await?.text);
        }

        let mut chunks = self.agent.provider.stream(request).await?;
        let mut text = String::new();
        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;
            if let Some(content) = chunk.content {
                text.push_str(&content);
            }
            if chunk.done {
                break;
            }
        }
        Ok(text)
    }

    fn read(&mut self, response: String, reprompted: bool) -> Next {
        let step = parser::parse(&response);
        debug!(rule = ?step.rule, has_action = step.has_action(), "Parsed model response");

        if let Some(reasoning) = &step.reasoning {
            self.pending.push_back(AgentEvent::Reasoning {
                content: reasoning.clone(),
            });
        }

        if step.is_final {
            let mut answer = decode_final_answer(step.action_argument.as_deref().unwrap_or_default());
            if answer.trim().is_empty() {
                answer = response.trim().to_string();
            }
            self.conversation.push(Turn::model(response));
            self.finish(answer);
            return Next::Settled;
        }

        if let (Some(name), Some(argument)) = (step.action_name, step.action_argument) {
            if self.guard.check(ActionSignature::new(&name, &argument)) == Verdict::Repeated {
                self.fail(AgentError::LoopDetected {
                    name,
                    argument,
                    iteration: self.iteration,
                });
                return Next::Settled;
            }
            self.pending
                .push_back(AgentEvent::action_proposed(&name, &argument));
            self.phase = Phase::Act(PendingAction {
                name,
                argument,
                response,
                reasoned: step.reasoning.is_some(),
            });
            return Next::Settled;
        }

        let settings = &self.agent.settings;
        if settings.reasoning == ReasoningPolicy::Sparse && step.reasoning.is_some() {
            if settings.history == HistoryRetention::RetainAll {
                self.conversation.push(Turn::model(response));
            }
            self.phase = Phase::Begin;
            return Next::Settled;
        }

        self.repair(response, reprompted)
    }

    fn repair(&mut self, response: String, reprompted: bool) -> Next {
        let policy = self.agent.settings.reasoning;
        match self.agent.settings.repair {
            RepairStrategy::Reprompt if !reprompted => Next::Reprompt(response),
            RepairStrategy::ForceFinish => {
                let answer = self.forced_answer(&response);
                if answer.is_empty() {
                    self.fail(AgentError::FormatViolation {
                        policy,
                        output: response,
                    });
                } else {
                    self.pending.push_back(AgentEvent::info(
                        "Response did not follow the format, treating it as the final answer",
                    ));
                    self.conversation.push(Turn::model(response));
                    self.finish(answer);
                }
                Next::Settled
            }
            _ => {
                self.fail(AgentError::FormatViolation {
                    policy,
                    output: response,
                });
                Next::Settled
            }
        }
    }

    /// The stdout of the last successful observation, else the response itself.
    fn forced_answer(&self, response: &str) -> String {
        if let Some(observation) = self.conversation.last_observation()
            && observation.text.starts_with("SUCCESS")
        {
            let text = &observation.text;
            let stdout = match text.split_once("[STDOUT]:") {
                Some((_, rest)) => rest.split("[STDERR]:").next().unwrap_or(rest),
                None => text,
            };
            return stdout.trim().to_string();
        }
        response.trim().to_string()
    }

    async fn act(&mut self, action: PendingAction) {
        let PendingAction {
            name,
            argument,
            response,
            reasoned,
        } = action;

        let (tool, output) = match self.dispatcher.dispatch(&name, &argument).await {
            Ok(dispatched) => (dispatched.tool, dispatched.result.output),
            Err(err) => match self.observe_failure(err) {
                Ok(output) => (name, output),
                Err(err) => return self.fail(err),
            },
        };

        self.pending.push_back(AgentEvent::Observation {
            tool: tool.clone(),
            content: output.clone(),
        });
        let call_id = format!("call_{tool}_{}", self.iteration);
        self.conversation.push(Turn::model(response.clone()));
        self.conversation
            .push(Turn::tool_observation(call_id, tool, output));

        // Dense steps need a thought alongside the action
        if self.agent.settings.reasoning == ReasoningPolicy::Dense && !reasoned {
            return self.fail(AgentError::FormatViolation {
                policy: ReasoningPolicy::Dense,
                output: response,
            });
        }

        self.phase = Phase::Begin;
    }

    /// Turn a tool failure into an observation when the policy allows it.
    fn observe_failure(&mut self, err: AgentError) -> Result<String, AgentError> {
        let settings = &self.agent.settings;
        let tool_failure = matches!(
            err,
            AgentError::ToolNotFound { .. } | AgentError::ToolExecutionFailed { .. }
        );
        if tool_failure
            && settings.tool_errors == ToolErrorPolicy::Observe
            && self.tool_failures < settings.max_tool_failures
        {
            self.tool_failures += 1;
            warn!(
                error = %err,
                failures = self.tool_failures,
                max = settings.max_tool_failures,
                "Tool failed, returning the error to the model"
            );
            return Ok(format!("Error: {err}"));
        }
        Err(err)
    }

    fn finish(&mut self, answer: String) {
        info!(
            conversation_id = %self.conversation.id,
            iterations = self.iteration,
            "ReAct run finished"
        );
        self.pending.push_back(AgentEvent::FinalAnswer {
            content: answer.clone(),
        });
        self.answer = Some(answer);
        self.phase = Phase::Done;
    }

    fn fail(&mut self, err: AgentError) {
        warn!(
            conversation_id = %self.conversation.id,
            iterations = self.iteration,
            kind = %err.kind(),
            error = %err,
            "ReAct run failed"
        );
        self.pending.push_back(AgentEvent::error(&err));
        self.failure = Some(err);
        self.phase = Phase::Done;
    }
}

/// Events of a run driven on a private current-thread runtime.
pub struct BlockingEvents {
    runtime: tokio::runtime::Runtime,
    run: AgentRun,
}

impl BlockingEvents {
    pub fn into_conversation(self) -> Conversation {
        self.run.into_conversation()
    }
}

impl Iterator for BlockingEvents {
    type Item = AgentEvent;

    fn next(&mut self) -> Option<AgentEvent> {
        self.runtime.block_on(self.run.next_event())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_helpers::{FailingTool, PanickingTool, RecordingTool, ScriptedProvider};
    use futures::StreamExt;
    use ponder_core::error::ProviderError;
    use ponder_core::message::Role;
    use ponder_core::tool::Tool;

    fn agent(provider: &Arc<ScriptedProvider>, tools: Vec<Box<dyn Tool>>) -> ReactAgent {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        ReactAgent::new(provider.clone(), Arc::new(registry), "test-model")
    }

    fn calculator() -> Box<dyn Tool> {
        Box::new(RecordingTool::new("calculate", "4"))
    }

    fn types(events: &[AgentEvent]) -> Vec<&'static str> {
        events.iter().map(AgentEvent::event_type).collect()
    }

    fn iteration_notes(events: &[AgentEvent]) -> usize {
        events
            .iter()
            .filter(|e| e.content().starts_with("Iteration "))
            .count()
    }

    #[tokio::test]
    async fn calculator_run_event_sequence() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: I need to add the numbers.\nAction: calculate[2+2]",
            "Thought: I have the result.\nAction: finish[4]",
        ]));
        let agent = agent(&provider, vec![calculator()]);

        let events: Vec<AgentEvent> = agent.stream("What is 2+2?").collect().await;

        assert_eq!(
            types(&events),
            vec![
                "info",
                "reasoning",
                "action_proposed",
                "observation",
                "info",
                "reasoning",
                "final_answer"
            ]
        );
        assert_eq!(events[0].content(), "Iteration 1/7");
        assert_eq!(events[2].content(), "Action: calculate[2+2]");
        assert_eq!(events[3].content(), "4");
        assert_eq!(events[6].content(), "4");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn conversation_records_turns_in_order() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: add\nAction: calculate[2+2]",
            "Thought: done\nAction: finish[4]",
        ]));
        let agent = agent(&provider, vec![calculator()]);
        let mut run = agent.start("What is 2+2?");
        while run.next_event().await.is_some() {}

        assert_eq!(run.answer(), Some("4"));
        let turns = run.conversation().turns();
        let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Model, Role::ToolObservation, Role::Model]
        );
        assert_eq!(turns[3].tool_call_id.as_deref(), Some("call_calculate_1"));
        assert_eq!(turns[3].tool_name.as_deref(), Some("calculate"));

        // The second call saw the observation
        let second = &provider.requests()[1];
        assert_eq!(second.turns.len(), 4);
        assert_eq!(second.turns[3].text, "4");
    }

    #[tokio::test]
    async fn unknown_tool_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: try something\nAction: unknown_tool[x]",
        ]));
        let agent = agent(&provider, vec![calculator()]);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(types(&events), vec!["info", "reasoning", "action_proposed", "error"]);
        assert_eq!(events[3].error_kind(), Some(ErrorKind::ToolNotFound));
        assert!(events[3].content().contains("calculate, finish"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn repeated_action_is_a_loop() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: search\nAction: google_search[foo]",
            "Thought: search again\nAction: google_search[foo]",
        ]));
        let search = RecordingTool::new("google_search", "nothing useful");
        let agent = agent(&provider, vec![Box::new(search.clone())]).with_loop_window(1);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        let last = events.last().unwrap();
        assert_eq!(last.error_kind(), Some(ErrorKind::LoopDetected));
        assert_eq!(search.calls().len(), 1);
        assert_eq!(
            types(&events).iter().filter(|t| **t == "action_proposed").count(),
            1
        );
    }

    #[tokio::test]
    async fn unknown_tool_without_thought_is_tool_not_found() {
        let provider = Arc::new(ScriptedProvider::new(&["Action: unknown_tool[x]"]));
        let agent = agent(&provider, vec![calculator()]);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(types(&events), vec!["info", "action_proposed", "error"]);
        assert_eq!(events[2].error_kind(), Some(ErrorKind::ToolNotFound));
    }

    #[tokio::test]
    async fn sparse_repeat_without_thought_is_a_loop() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Action: google_search[foo]",
            "Action: google_search[foo]",
        ]));
        let search = RecordingTool::new("google_search", "nothing useful");
        let agent = agent(&provider, vec![Box::new(search.clone())])
            .with_reasoning(ReasoningPolicy::Sparse)
            .with_loop_window(1);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(
            types(&events),
            vec!["info", "action_proposed", "observation", "info", "error"]
        );
        assert_eq!(events[4].error_kind(), Some(ErrorKind::LoopDetected));
        assert_eq!(search.calls().len(), 1);
    }

    #[tokio::test]
    async fn dense_repeat_without_thought_stops_at_first_observation() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Action: google_search[foo]",
            "Action: google_search[foo]",
        ]));
        let search = RecordingTool::new("google_search", "nothing useful");
        let agent = agent(&provider, vec![Box::new(search.clone())]).with_loop_window(1);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(types(&events), vec!["info", "action_proposed", "observation", "error"]);
        assert_eq!(events[3].error_kind(), Some(ErrorKind::FormatViolation));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn dense_response_without_action_is_a_violation() {
        let provider = Arc::new(ScriptedProvider::new(&["I am not sure what to do."]));
        let agent = agent(&provider, vec![calculator()]);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(types(&events), vec!["info", "error"]);
        assert_eq!(events[1].error_kind(), Some(ErrorKind::FormatViolation));
    }

    #[tokio::test]
    async fn dense_action_without_thought_fails_after_observation() {
        let provider = Arc::new(ScriptedProvider::new(&["Action: calculate[2+2]"]));
        let agent = agent(&provider, vec![calculator()]);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(types(&events), vec!["info", "action_proposed", "observation", "error"]);
        assert_eq!(events[3].error_kind(), Some(ErrorKind::FormatViolation));
    }

    #[tokio::test]
    async fn sparse_thought_only_step_continues() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: let me think about this",
            "Action: calculate[2+2]",
            "Action: finish[4]",
        ]));
        let agent = agent(&provider, vec![calculator()]).with_reasoning(ReasoningPolicy::Sparse);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(
            types(&events),
            vec![
                "info",
                "reasoning",
                "info",
                "action_proposed",
                "observation",
                "info",
                "final_answer"
            ]
        );
        let second = &provider.requests()[1];
        assert_eq!(second.turns.len(), 3);
        assert_eq!(second.turns[2].text, "Thought: let me think about this");
    }

    #[tokio::test]
    async fn actions_only_history_drops_thought_turns() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: pondering",
            "Action: finish[done]",
        ]));
        let agent = agent(&provider, vec![])
            .with_reasoning(ReasoningPolicy::Sparse)
            .with_history(HistoryRetention::ActionsOnly);

        assert_eq!(agent.invoke("q").await.unwrap(), "done");
        assert_eq!(provider.requests()[1].turns.len(), 2);
    }

    #[tokio::test]
    async fn sparse_response_with_nothing_is_a_violation() {
        let provider = Arc::new(ScriptedProvider::new(&["hmm"]));
        let agent = agent(&provider, vec![]).with_reasoning(ReasoningPolicy::Sparse);

        let err = agent.invoke("q").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatViolation);
    }

    #[tokio::test]
    async fn budget_exhaustion_emits_one_error() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: a\nAction: calculate[1+1]",
            "Thought: b\nAction: calculate[2+2]",
        ]));
        let agent = agent(&provider, vec![calculator()]).with_max_iterations(2);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(iteration_notes(&events), 2);
        assert_eq!(types(&events).iter().filter(|t| **t == "error").count(), 1);
        let last = events.last().unwrap();
        assert_eq!(last.error_kind(), Some(ErrorKind::IterationsExhausted));
        assert!(last.content().contains("Max iterations (2)"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn reprompt_repairs_once_without_spending_budget() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "no format here",
            "Thought: ok\nAction: finish[done]",
        ]));
        let agent = agent(&provider, vec![])
            .with_repair(RepairStrategy::Reprompt)
            .with_max_iterations(1);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        assert_eq!(events.last().unwrap().content(), "done");
        assert_eq!(iteration_notes(&events), 1);
        assert_eq!(provider.call_count(), 2);

        let retry = &provider.requests()[1];
        let last = retry.turns.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.text, REFORMAT_REQUEST);
        assert_eq!(retry.turns[retry.turns.len() - 2].text, "no format here");
    }

    #[tokio::test]
    async fn reprompt_second_violation_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(&["bad", "still bad"]));
        let agent = agent(&provider, vec![]).with_repair(RepairStrategy::Reprompt);

        let err = agent.invoke("q").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::FormatViolation { ref output, .. } if output == "still bad"
        ));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn force_finish_uses_raw_response() {
        let provider = Arc::new(ScriptedProvider::new(&["The answer is 42."]));
        let agent = agent(&provider, vec![]).with_repair(RepairStrategy::ForceFinish);

        assert_eq!(agent.invoke("q").await.unwrap(), "The answer is 42.");
    }

    #[tokio::test]
    async fn force_finish_prefers_last_successful_stdout() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: run it\nAction: run_shell_command[echo hello]",
            "The command printed hello.",
        ]));
        let shell = RecordingTool::new("run_shell_command", "SUCCESS:\n[STDOUT]:\nhello\n");
        let agent = agent(&provider, vec![Box::new(shell)]).with_repair(RepairStrategy::ForceFinish);

        assert_eq!(agent.invoke("q").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn observe_policy_feeds_failures_back() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: try\nAction: always_fails[x]",
            "Thought: give up\nAction: finish[gave up]",
        ]));
        let agent = agent(&provider, vec![Box::new(FailingTool)])
            .with_tool_errors(ToolErrorPolicy::Observe, 1);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;

        let observation = events
            .iter()
            .find(|e| e.event_type() == "observation")
            .unwrap();
        assert!(observation
            .content()
            .starts_with("Error: Error executing tool 'always_fails'"));
        assert_eq!(events.last().unwrap().content(), "gave up");
    }

    #[tokio::test]
    async fn observe_policy_has_a_failure_limit() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: try\nAction: always_fails[x]",
            "Thought: again\nAction: always_fails[y]",
        ]));
        let agent = agent(&provider, vec![Box::new(FailingTool)])
            .with_tool_errors(ToolErrorPolicy::Observe, 1);

        let err = agent.invoke("q").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolExecutionFailed);
    }

    #[tokio::test]
    async fn observe_policy_covers_unknown_tools() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: try\nAction: nope[x]",
            "Thought: ok\nAction: finish[fine]",
        ]));
        let agent = agent(&provider, vec![]).with_tool_errors(ToolErrorPolicy::Observe, 2);

        assert_eq!(agent.invoke("q").await.unwrap(), "fine");
        let observation = &provider.requests()[1].turns[3];
        assert!(observation.text.starts_with("Error: Tool 'nope' is not recognized"));
    }

    #[tokio::test]
    async fn panicking_tool_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(&["Thought: t\nAction: panics[x]"]));
        let agent = agent(&provider, vec![Box::new(PanickingTool)]);

        let err = agent.invoke("q").await.unwrap_err();
        match err {
            AgentError::ToolExecutionFailed { reason, .. } => assert!(reason.contains("tool exploded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![Err(
            ProviderError::Timeout("30s".into()),
        )]));
        let agent = agent(&provider, vec![]);

        let events: Vec<AgentEvent> = agent.stream("q").collect().await;
        assert_eq!(types(&events), vec!["info", "error"]);
        assert_eq!(events[1].error_kind(), Some(ErrorKind::ModelFailed));
    }

    #[tokio::test]
    async fn final_answer_label_ends_the_run() {
        let provider = Arc::new(ScriptedProvider::new(&["Thought: easy\nFinal Answer: Paris"]));
        let agent = agent(&provider, vec![]);

        let events: Vec<AgentEvent> = agent.stream("Capital of France?").collect().await;
        assert_eq!(types(&events), vec!["info", "reasoning", "final_answer"]);
        assert_eq!(events[2].content(), "Paris");
    }

    #[tokio::test]
    async fn empty_finish_argument_falls_back_to_response() {
        let provider = Arc::new(ScriptedProvider::new(&["Thought: t\nAction: finish[]"]));
        let agent = agent(&provider, vec![]);

        assert_eq!(
            agent.invoke("q").await.unwrap(),
            "Thought: t\nAction: finish[]"
        );
    }

    #[tokio::test]
    async fn streamed_model_output_is_concatenated() {
        let provider = Arc::new(
            ScriptedProvider::new(&[
                "Thought: add\nAction: calculate[2+2]",
                "Thought: done\nAction: finish[4]",
            ])
            .chunked(3),
        );
        let agent = agent(&provider, vec![calculator()]).with_stream_model(true);

        assert_eq!(agent.invoke("q").await.unwrap(), "4");
        assert!(provider.requests()[0].stream);
    }

    #[tokio::test]
    async fn request_carries_sampling_settings() {
        let provider = Arc::new(ScriptedProvider::new(&["Thought: t\nAction: finish[x]"]));
        let agent = agent(&provider, vec![calculator()])
            .with_temperature(0.2)
            .with_max_tokens(256);

        agent.invoke("q").await.unwrap();
        let request = &provider.requests()[0];
        assert_eq!(request.model, "test-model");
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.stop, vec!["\nObservation:".to_string()]);
        assert_eq!(request.turns[0].role, Role::System);
        assert!(request.turns[0].text.contains("- calculate: "));
        assert_eq!(request.turns[1].text, "q");
    }

    #[tokio::test]
    async fn system_prompt_override_is_verbatim() {
        let provider = Arc::new(ScriptedProvider::new(&["Action: finish[x]"]));
        let agent = agent(&provider, vec![]).with_system_prompt("Be brief.");

        agent.invoke("q").await.unwrap();
        assert_eq!(provider.requests()[0].turns[0].text, "Be brief.");
    }

    #[tokio::test]
    async fn resume_continues_a_conversation() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: t\nAction: finish[first]",
            "Thought: t\nAction: finish[second]",
        ]));
        let agent = agent(&provider, vec![]);

        let mut run = agent.start("one");
        while run.next_event().await.is_some() {}
        let conversation = run.into_conversation();

        let answer = agent.resume(conversation, "two").into_answer().await.unwrap();
        assert_eq!(answer, "second");

        let turns = &provider.requests()[1].turns;
        assert_eq!(turns.iter().filter(|t| t.role == Role::System).count(), 1);
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[3].text, "two");
    }

    #[tokio::test]
    async fn spawned_stream_delivers_all_events() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: add\nAction: calculate[2+2]",
            "Thought: done\nAction: finish[4]",
        ]));
        let agent = agent(&provider, vec![calculator()]);

        let mut rx = agent.spawn_stream("q");
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 7);
        assert_eq!(events.last().unwrap().event_type(), "final_answer");
    }

    #[tokio::test]
    async fn consumer_can_stop_early() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: add\nAction: calculate[2+2]",
            "Thought: done\nAction: finish[4]",
        ]));
        let agent = agent(&provider, vec![calculator()]);

        let first: Vec<AgentEvent> = agent.stream("q").take(2).collect().await;
        assert_eq!(types(&first), vec!["info", "reasoning"]);
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn blocking_wrappers() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Thought: t\nAction: finish[blocking]",
            "Thought: t\nAction: finish[iterated]",
        ]));
        let agent = agent(&provider, vec![]);

        assert_eq!(agent.invoke_blocking("q").unwrap(), "blocking");

        let events: Vec<AgentEvent> = agent.stream_blocking("q").unwrap().collect();
        assert_eq!(events.last().unwrap().content(), "iterated");
    }
}
