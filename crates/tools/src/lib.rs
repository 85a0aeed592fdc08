//! Tool contract, execution engine and the built-in tools.
//!
//! A [`Tool`] describes itself with a JSON schema and does one job. The
//! [`ToolEngine`] wraps every call with the shared envelope: enablement,
//! parameter validation, a security gate, a deadline, bounded retries and
//! statistics. Tools live in a [`ToolRegistry`] and are reached through a
//! [`ToolDispatcher`].

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod file_system;
pub mod registry;
pub mod result;
pub mod retry;
pub mod stats;
pub mod traits;
pub mod validation;
pub mod web_search;

pub use config::ToolConfig;
pub use dispatcher::ToolDispatcher;
pub use engine::ToolEngine;
pub use error::{ErrorKind, ToolError};
pub use file_system::{FileSystemConfig, FileSystemTool};
pub use registry::{ToolInfo, ToolRegistry};
pub use result::ToolResult;
pub use retry::{ExponentialBackoff, RetryStrategy};
pub use stats::{StatsSnapshot, ToolStats};
pub use traits::Tool;
pub use validation::validate_params;
pub use web_search::{SearchEngine, WebSearchConfig, WebSearchTool};
