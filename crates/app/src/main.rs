use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use toolwarden_runtime::{load_runtime_config, Message, RuntimeConfig, ToolRuntime};
use tracing::{debug, info};

const DEFAULT_CONFIG: &str = "toolwarden.yaml";

const USAGE: &str = "\
Usage:
  toolwarden [--config FILE] chat \"<message>\" [--session ID]
  toolwarden [--config FILE] tool <name> '<json params>'
  toolwarden [--config FILE] tools";

#[derive(Debug, PartialEq)]
enum Command {
    Chat {
        message: String,
        session: Option<String>,
    },
    Tool {
        name: String,
        params: Value,
    },
    Tools,
}

#[derive(Debug, PartialEq)]
struct Invocation {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut config = None;
    let mut session = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config requires a file")?;
                config = Some(PathBuf::from(path));
            }
            "--session" => {
                let id = iter.next().context("--session requires an id")?;
                session = Some(id.clone());
            }
            "-h" | "--help" => bail!("{}", USAGE),
            _ => positional.push(arg.clone()),
        }
    }

    let command = match positional.first().map(String::as_str) {
        Some("chat") => {
            let message = positional.get(1).context("chat requires a message")?;
            Command::Chat {
                message: message.clone(),
                session,
            }
        }
        Some("tool") => {
            let name = positional.get(1).context("tool requires a name")?;
            let params = match positional.get(2) {
                Some(raw) => serde_json::from_str(raw)
                    .with_context(|| format!("Invalid JSON params: {}", raw))?,
                None => json!({}),
            };
            Command::Tool {
                name: name.clone(),
                params,
            }
        }
        Some("tools") => Command::Tools,
        Some(other) => bail!("Unknown command: {}\n{}", other, USAGE),
        None => bail!("{}", USAGE),
    };

    Ok(Invocation { config, command })
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => load_runtime_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => load_runtime_config(DEFAULT_CONFIG)
            .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG)),
        None => {
            debug!("No config file, using defaults");
            Ok(RuntimeConfig::default())
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = parse_args(&args)?;
    let config = load_config(invocation.config.as_deref())?;
    let runtime = ToolRuntime::new(config).context("Failed to build tool runtime")?;
    info!(tools = runtime.registry().count(), "toolwarden started");

    let outcome = match invocation.command {
        Command::Chat { message, session } => {
            let outcome = runtime
                .chat(vec![Message::user(message)], session.as_deref())
                .await
                .context("Chat failed")?;
            serde_json::to_value(&outcome)?
        }
        Command::Tool { name, params } => {
            let (session_id, result) = runtime.execute_tool(&name, params, None).await;
            json!({"session_id": session_id, "result": result.to_json()})
        }
        Command::Tools => json!({
            "tools": runtime.available_tools(),
            "statistics": runtime.statistics(),
        }),
    };

    runtime.shutdown().await;
    print_json(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_chat_with_session_and_config() {
        let inv = parse_args(&args(&["--config", "cfg.yaml", "chat", "hello there", "--session", "s1"]))
            .unwrap();
        assert_eq!(inv.config, Some(PathBuf::from("cfg.yaml")));
        assert_eq!(
            inv.command,
            Command::Chat {
                message: "hello there".to_string(),
                session: Some("s1".to_string())
            }
        );
    }

    #[test]
    fn test_parse_tool_params() {
        let inv = parse_args(&args(&["tool", "file_system", r#"{"operation":"list","path":"."}"#])).unwrap();
        match inv.command {
            Command::Tool { name, params } => {
                assert_eq!(name, "file_system");
                assert_eq!(params["operation"], "list");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["chat"])).is_err());
        assert!(parse_args(&args(&["tool", "x", "{broken"])).is_err());
        assert!(parse_args(&args(&["dance"])).is_err());
        assert!(parse_args(&args(&["tools", "--config"])).is_err());
    }

    #[test]
    fn test_parse_tools() {
        assert_eq!(parse_args(&args(&["tools"])).unwrap().command, Command::Tools);
    }
}
