//! Agents, tasks, and the crew that runs them.
//!
//! An [`Agent`] is a persona (role, goal, backstory) plus sampling
//! settings. A [`Task`] is a description and the expected shape of its
//! answer. A [`Crew`] executes its tasks in order against a
//! [`ChatModel`]; each task becomes one chat request, and a task's output
//! is handed to the next task as context.
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌───────────┐
//! │  Agent   │──▶│ system: persona          │──▶│ ChatModel │
//! │  Task(s) │   │ user:   context messages │   └─────┬─────┘
//! └──────────┘   │ user:   task + criteria  │         ▼
//!                └──────────────────────────┘     task output
//! ```

use anyhow::{bail, Result};
use std::time::Instant;

use crate::llm::{ChatModel, ChatRequest};
use crate::models::ChatMessage;

#[derive(Debug, Clone)]
pub struct Agent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub temperature: f32,
    /// Recorded for parity with multi-agent setups; a single-agent crew
    /// never delegates.
    pub allow_delegation: bool,
}

impl Agent {
    /// The PDF analyst persona used by the assistant pages.
    pub fn pdf_analyst(temperature: f32) -> Self {
        Self {
            role: "PDF Analyst".to_string(),
            goal: "Analyze and answer questions about the PDF content".to_string(),
            backstory: "An expert in analyzing PDF documents and providing accurate information."
                .to_string(),
            temperature,
            allow_delegation: false,
        }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.role, self.backstory, self.goal
        )
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub description: String,
    pub expected_output: String,
    /// Messages placed between the persona and the task prompt.
    pub context: Vec<ChatMessage>,
}

impl Task {
    pub fn new(description: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            expected_output: expected_output.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, message: ChatMessage) -> Self {
        self.context.push(message);
        self
    }

    fn prompt(&self) -> String {
        format!(
            "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\n\
             You MUST return the actual complete content as the final answer, not a summary.",
            self.description, self.expected_output
        )
    }
}

/// Output of one executed task.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub description: String,
    pub raw: String,
}

/// Result of a crew run; `raw` is the final task's output.
#[derive(Debug, Clone)]
pub struct CrewOutput {
    pub raw: String,
    pub tasks: Vec<TaskOutput>,
}

pub struct Crew {
    agent: Agent,
    tasks: Vec<Task>,
}

impl Crew {
    pub fn new(agent: Agent, tasks: Vec<Task>) -> Self {
        Self { agent, tasks }
    }

    /// The chat request a task produces, given earlier task outputs.
    pub fn build_request(&self, task: &Task, previous: &[TaskOutput]) -> ChatRequest {
        let mut messages = vec![ChatMessage::system(self.agent.system_prompt())];
        if !previous.is_empty() {
            let earlier = previous
                .iter()
                .map(|o| o.raw.as_str())
                .collect::<Vec<_>>()
                .join("\n\n----------\n\n");
            messages.push(ChatMessage::user(format!(
                "This is the context you're working with:\n{}",
                earlier
            )));
        }
        messages.extend(task.context.iter().cloned());
        messages.push(ChatMessage::user(task.prompt()));
        ChatRequest {
            messages,
            temperature: self.agent.temperature,
        }
    }

    /// Run every task in order.
    pub async fn kickoff(&self, model: &dyn ChatModel) -> Result<CrewOutput> {
        if self.tasks.is_empty() {
            bail!("crew has no tasks");
        }
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());
        for (i, task) in self.tasks.iter().enumerate() {
            let request = self.build_request(task, &outputs);
            let started = Instant::now();
            let raw = model.complete(&request).await?;
            tracing::info!(
                agent = %self.agent.role,
                model = model.model_name(),
                task = i,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "task completed"
            );
            outputs.push(TaskOutput {
                description: task.description.clone(),
                raw,
            });
        }
        let raw = outputs.last().map(|o| o.raw.clone()).unwrap_or_default();
        Ok(CrewOutput {
            raw,
            tasks: outputs,
        })
    }
}
