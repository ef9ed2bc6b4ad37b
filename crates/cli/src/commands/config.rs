use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use itemdesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

/// One reported setting: dotted key, rendered value and the environment
/// variables that can set it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Setting {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["ITEMDESK_DATABASE_URL"],
        },
        Setting {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["ITEMDESK_DATABASE_MAX_CONNECTIONS"],
        },
        Setting {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["ITEMDESK_DATABASE_TIMEOUT_SECS"],
        },
        Setting {
            key: "llm.provider",
            value: format!("{:?}", config.llm.provider).to_ascii_lowercase(),
            env_keys: &["ITEMDESK_LLM_PROVIDER"],
        },
        Setting {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["ITEMDESK_LLM_MODEL"],
        },
        Setting {
            key: "llm.base_url",
            value: config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["ITEMDESK_LLM_BASE_URL"],
        },
        Setting {
            key: "llm.api_key",
            value: api_key,
            env_keys: &["ITEMDESK_LLM_API_KEY", "OPENAI_API_KEY"],
        },
        Setting {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["ITEMDESK_LLM_TIMEOUT_SECS"],
        },
        Setting {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["ITEMDESK_SERVER_BIND_ADDRESS"],
        },
        Setting {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["ITEMDESK_SERVER_PORT"],
        },
        Setting {
            key: "server.health_check_port",
            value: config.server.health_check_port.to_string(),
            env_keys: &["ITEMDESK_SERVER_HEALTH_CHECK_PORT"],
        },
        Setting {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["ITEMDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Setting {
            key: "session.initial_message",
            value: config.session.initial_message.clone(),
            env_keys: &["ITEMDESK_SESSION_INITIAL_MESSAGE"],
        },
        Setting {
            key: "session.agent_name",
            value: config.session.agent_name.clone(),
            env_keys: &["ITEMDESK_SESSION_AGENT_NAME"],
        },
        Setting {
            key: "session.max_recovery_attempts",
            value: config.session.max_recovery_attempts.to_string(),
            env_keys: &["ITEMDESK_SESSION_MAX_RECOVERY_ATTEMPTS"],
        },
        Setting {
            key: "session.max_tool_rounds",
            value: config.session.max_tool_rounds.to_string(),
            env_keys: &["ITEMDESK_SESSION_MAX_TOOL_ROUNDS"],
        },
        Setting {
            key: "session.restart_grace_ms",
            value: config.session.restart_grace_ms.to_string(),
            env_keys: &["ITEMDESK_SESSION_RESTART_GRACE_MS"],
        },
        Setting {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["ITEMDESK_LOGGING_LEVEL", "ITEMDESK_LOG_LEVEL"],
        },
        Setting {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["ITEMDESK_LOGGING_FORMAT", "ITEMDESK_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("itemdesk.toml"), PathBuf::from("config/itemdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps a recognizable key prefix such as `sk-` and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
