//! Autonomous tool-use agents on top of the `steward-llm` dispatch layer.
//!
//! An [`Agent`] drives an LLM through a bounded completion/tool loop: the
//! model requests tool invocations, the agent executes them and feeds the
//! output back, and the run ends when the model calls the built-in
//! `give_result` tool (or answers without tools). Repeated identical tool
//! calls are suppressed, and the loop never spins past its iteration budget.
//!
//! Agents can delegate: with delegation enabled, the model gains
//! `spawn_worker` and `spawn_workers` tools that run disposable child agents
//! sharing the parent's router and credential rotation state.

pub mod agent;
pub mod config;
pub mod credentials;
pub mod task;
pub mod tools;
pub mod trace;

pub use agent::{Agent, CHAT_SYSTEM_PROMPT, DEFAULT_SYSTEM_PROMPT};
pub use config::{AgentConfig, CallOptions};
pub use credentials::{build_router, CredentialStore};
pub use task::{Task, TaskStatus, TaskStore};
pub use tools::{final_answer_schema, Tool, ToolOutcome, ToolRegistry, FINAL_ANSWER_TOOL};
pub use trace::{Trace, TraceIteration};

pub use steward_core::{AgentResult, Message, Role, StewardError, StewardResult};
