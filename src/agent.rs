//! The interactive reason/act/observe loop.
//!
//! For each user message the [`Agent`]:
//!
//! 1. **Retrieves** context for the message (if a retriever is configured)
//!    and prepends it to the user turn.
//! 2. **Reasons**: sends the whole conversation plus the tool catalog to
//!    the LLM and appends the assistant turn.
//! 3. **Acts**: if the turn requested tools, runs every call in request
//!    order through the [`ToolRegistry`].
//! 4. **Observes**: appends all results as one user turn and goes back to
//!    step 2. A turn without tool calls ends the cycle.
//!
//! LLM failures are fatal for the session; tool failures are not.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::llm::{ContentBlock, Conversation, LlmProvider, Message, Role};
use crate::retrieval::{inject_context, ContextRetriever};
use crate::tools::ToolRegistry;

/// Source of user messages. `Ok(None)` means end of input.
#[async_trait]
pub trait UserInput: Send {
    async fn next_message(&mut self) -> Result<Option<String>, std::io::Error>;
}

/// Reads lines from stdin behind a `You:` prompt.
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserInput for Console {
    async fn next_message(&mut self) -> Result<Option<String>, std::io::Error> {
        print!("\x1b[95mYou\x1b[0m: ");
        std::io::stdout().flush()?;
        self.lines.next_line().await
    }
}

/// What happened while answering one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Number of inference calls made.
    pub iterations: usize,
    /// Number of tool calls dispatched.
    pub tool_calls: usize,
    /// Text of the final assistant turn.
    pub reply: String,
}

pub struct Agent {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    retriever: Option<ContextRetriever>,
    conversation: Conversation,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        retriever: Option<ContextRetriever>,
    ) -> Self {
        Self {
            llm,
            tools,
            retriever,
            conversation: Conversation::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Read messages from `input` until it ends or `cancel` fires.
    pub async fn run(
        &mut self,
        input: &mut dyn UserInput,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        println!("Chat with Claude (use 'ctrl-c' to quit)");
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                line = input.next_message() => line?,
            };
            let Some(message) = message else {
                tracing::info!("input closed, ending session");
                return Ok(());
            };

            let outcome = self.run_turn(&message, &cancel).await?;
            tracing::debug!(
                iterations = outcome.iterations,
                tool_calls = outcome.tool_calls,
                "turn complete"
            );
        }
    }

    /// Answer one user message, looping through tool calls until the model
    /// replies without any.
    pub async fn run_turn(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        let context = match &self.retriever {
            Some(retriever) => retriever.retrieve(input).await,
            None => String::new(),
        };
        if !context.is_empty() {
            print!("\x1b[32mInjecting Context:\n{}\x1b[0m", context);
        }
        self.conversation
            .push(Message::user_text(inject_context(&context, input)));

        let specs = self.tools.specs();
        let mut outcome = TurnOutcome {
            iterations: 0,
            tool_calls: 0,
            reply: String::new(),
        };

        loop {
            println!("\x1b[34mThinking...\x1b[0m");
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                reply = self.llm.infer(self.conversation.messages(), &specs) => reply?,
            };
            outcome.iterations += 1;

            for text in reply.texts() {
                println!("\x1b[36mClaude: {}\x1b[0m", text);
            }
            let calls = reply.tool_calls();
            outcome.reply = reply.texts().collect::<Vec<_>>().join("\n");
            self.conversation.push(reply);

            if calls.is_empty() {
                return Ok(outcome);
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                println!("\x1b[33mExecuting: {}\x1b[0m", call.name);
                let result = self.tools.execute(&call.id, &call.name, &call.input).await;
                results.push(ContentBlock::from(result));
            }
            outcome.tool_calls += calls.len();

            println!("\x1b[32mObserving results...\x1b[0m");
            self.conversation.push(Message {
                role: Role::User,
                content: results,
            });
        }
    }
}
