//! Toolwarden Runtime
//!
//! Completion client, bounded tool-calling loop and session bookkeeping on
//! top of the policy-governed tools.

pub mod types;
pub mod interfaces;
pub mod config;
pub mod llm_client;
pub mod session;
pub mod agent_loop;
pub mod runtime;
pub mod metrics;

pub use types::{CompletionResponse, Message, Role, ToolCallRequest};
pub use interfaces::{CompletionClient, RuntimeError};
pub use config::{load_runtime_config, parse_runtime_config, CompletionConfig, RuntimeConfig};
pub use llm_client::OpenAIClient;
pub use session::{SessionInfo, SessionStore, SessionSummary, ToolCallRecord};
pub use agent_loop::{system_prompt, LoopOutcome, LoopStatus, ToolCallOutcome, ToolLoop};
pub use runtime::{RuntimeStatistics, ToolRuntime, ToolRuntimeBuilder};
