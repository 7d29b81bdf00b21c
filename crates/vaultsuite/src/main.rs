use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use vaultsuite_core::keys::gather_keys;
use vaultsuite_core::{
    EngineOptions, EngineSettings, KvOptions, KvVersion, SecretsConfig, SecretsError,
    SecretsManager, UnsealOptions,
};

#[derive(Debug, Parser)]
#[command(name = "vaultsuite", version)]
struct Cli {
    /// Config file (otherwise $VAULTSUITE_CONFIG, ~/.vaultsuite/config.toml, or VAULT_* env).
    #[arg(long = "config-file", global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// Override the secrets engine mount.
    #[arg(long)]
    mount: Option<String>,

    /// KV engine version (1 or 2).
    #[arg(long = "engine-version")]
    engine_version: Option<KvVersion>,
}

impl EngineArgs {
    fn options(&self) -> KvOptions {
        KvOptions {
            mount: self
                .mount
                .as_deref()
                .map(|m| m.trim_matches('/'))
                .filter(|m| !m.is_empty())
                .map(str::to_owned),
            version: self.engine_version,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Read a secret from the configured backend.
    #[command(name = "vault:read")]
    Read {
        /// Secret path to fetch.
        path: String,

        /// Specific (optionally dotted) key within the secret payload. A
        /// missing key prints an empty line.
        #[arg(long)]
        key: Option<String>,

        /// Secrets driver to target.
        #[arg(long)]
        driver: Option<String>,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output raw JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List secrets beneath a path.
    #[command(name = "vault:list")]
    List {
        /// Secrets path to list.
        path: String,

        #[arg(long)]
        driver: Option<String>,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Display the seal status of the backend.
    #[command(name = "vault:status")]
    Status {
        #[arg(long)]
        driver: Option<String>,
    },
    /// Submit key shares to unseal the backend.
    #[command(name = "vault:unseal")]
    Unseal {
        /// Unseal key shares.
        keys: Vec<String>,

        #[arg(long)]
        driver: Option<String>,

        /// Reset the unseal process before submitting keys.
        #[arg(long, default_value_t = false)]
        reset: bool,

        /// Migrate the seal if required.
        #[arg(long, default_value_t = false)]
        migrate: bool,

        /// File containing newline separated key shares (`#` comments allowed).
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Enable a secrets engine.
    #[command(name = "vault:enable-engine")]
    EnableEngine {
        /// Mount path for the secrets engine.
        path: String,

        /// Engine type.
        #[arg(long = "type", default_value = "kv")]
        engine_type: String,

        #[arg(long)]
        driver: Option<String>,

        /// Description for the mount.
        #[arg(long)]
        description: Option<String>,

        /// key=value options forwarded to the engine (repeatable).
        #[arg(long = "option")]
        options: Vec<String>,

        /// key=value mount configuration (repeatable).
        #[arg(long = "config")]
        config: Vec<String>,

        /// Mount the engine locally (not replicated).
        #[arg(long, default_value_t = false)]
        local: bool,

        /// Enable seal wrapping for the engine.
        #[arg(long = "seal-wrap", default_value_t = false)]
        seal_wrap: bool,
    },
}

/// What a command prints to stdout and whether it counts as success.
#[derive(Debug, PartialEq, Eq)]
struct CommandOutput {
    text: String,
    success: bool,
}

impl CommandOutput {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }

    fn failed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: false,
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match SecretsConfig::load(cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("vaultsuite: {e}");
            std::process::exit(1);
        }
    };
    let manager = SecretsManager::new(config);

    match run(&manager, cli.cmd).await {
        Ok(out) => {
            if !out.text.is_empty() {
                println!("{}", out.text);
            }
            if !out.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("vaultsuite: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(manager: &SecretsManager, cmd: Cmd) -> Result<CommandOutput, SecretsError> {
    match cmd {
        Cmd::Read {
            path,
            key,
            driver,
            engine,
            json,
        } => {
            let path = required_path(&path)?;
            let key = key.as_deref().filter(|k| !k.is_empty());
            let result = manager
                .fetch(path, key, &engine.options(), driver.as_deref())
                .await?;
            Ok(render_read(result.as_ref(), json))
        }
        Cmd::List {
            path,
            driver,
            engine,
        } => {
            let keys = manager
                .list(&path, &engine.options(), driver.as_deref())
                .await?;
            Ok(render_list(&path, &keys))
        }
        Cmd::Status { driver } => {
            let status = manager.seal_status(driver.as_deref()).await?;
            let name = driver
                .as_deref()
                .unwrap_or(manager.registry().default_driver());
            Ok(CommandOutput::ok(render_status(name, &status)))
        }
        Cmd::Unseal {
            keys,
            driver,
            reset,
            migrate,
            file,
        } => {
            let keys = gather_keys(&keys, file.as_deref())?;
            if keys.is_empty() {
                return Err(SecretsError::Input("No unseal keys were provided.".into()));
            }
            let options = UnsealOptions {
                reset: Some(reset),
                migrate: Some(migrate),
            };
            let status = manager.unseal(&keys, &options, driver.as_deref()).await?;
            if status.is_unsealed() {
                Ok(CommandOutput::ok("Vault has been unsealed successfully."))
            } else {
                Ok(CommandOutput::failed(format!(
                    "Vault remains sealed. Progress: {}/{} key shares submitted.",
                    status.progress, status.t
                )))
            }
        }
        Cmd::EnableEngine {
            path,
            engine_type,
            driver,
            description,
            options,
            config,
            local,
            seal_wrap,
        } => {
            let path = required_path(&path)?;
            let settings = EngineSettings {
                description: description.filter(|d| !d.is_empty()),
                config: parse_key_value_options(&config),
                options: parse_key_value_options(&options),
            };
            let flags = EngineOptions { local, seal_wrap };
            manager
                .enable_secrets_engine(&engine_type, path, &settings, &flags, driver.as_deref())
                .await?;
            Ok(CommandOutput::ok(format!(
                "Secrets engine [{engine_type}] mounted at [{path}]."
            )))
        }
    }
}

fn required_path(path: &str) -> Result<&str, SecretsError> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.trim_matches('/').is_empty() {
        return Err(SecretsError::Input("A secret path is required.".into()));
    }
    Ok(trimmed)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn two_column(rows: &[(String, String)]) -> String {
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(k, v)| format!("{k:<width$}  {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_read(result: Option<&Value>, json: bool) -> CommandOutput {
    if json {
        let value = result.cloned().unwrap_or(Value::Null);
        return CommandOutput::ok(
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "null".to_string()),
        );
    }

    match result {
        None => CommandOutput::ok(String::new()),
        Some(Value::Object(map)) if map.is_empty() => CommandOutput::ok("Secret payload is empty."),
        Some(Value::Object(map)) => {
            let rows: Vec<(String, String)> = map
                .iter()
                .map(|(k, v)| (k.clone(), scalar_text(v)))
                .collect();
            CommandOutput::ok(two_column(&rows))
        }
        Some(scalar) => CommandOutput::ok(scalar_text(scalar)),
    }
}

fn render_list(path: &str, keys: &[String]) -> CommandOutput {
    if keys.is_empty() {
        return CommandOutput::ok("No secrets found.");
    }
    let mut lines = vec![format!("Secrets beneath {}:", path.trim_matches('/'))];
    lines.extend(keys.iter().map(|k| format!("- {k}")));
    CommandOutput::ok(lines.join("\n"))
}

fn yes_no(b: bool) -> String {
    let text = if b { "yes" } else { "no" };
    text.to_owned()
}

fn render_status(driver: &str, status: &vaultsuite_core::SealStatus) -> String {
    two_column(&[
        ("Driver".into(), driver.to_owned()),
        ("Sealed".into(), yes_no(status.sealed)),
        ("Progress".into(), format!("{}/{}", status.progress, status.t)),
        ("Initialized".into(), yes_no(status.initialized)),
        (
            "Cluster".into(),
            status.cluster_name().unwrap_or("n/a").to_owned(),
        ),
        (
            "Version".into(),
            status.version().unwrap_or("n/a").to_owned(),
        ),
    ])
}

// ---------------------------------------------------------------------------
// key=value options
// ---------------------------------------------------------------------------

/// Parse repeated `key=value` flags, skipping entries without `=` or with
/// an empty key.
fn parse_key_value_options(entries: &[String]) -> Map<String, Value> {
    let mut parsed = Map::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        parsed.insert(key.to_owned(), cast_option_value(value));
    }
    parsed
}

fn cast_option_value(value: &str) -> Value {
    let unquoted = strip_wrapping_quotes(value);
    match unquoted.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => cast_numeric_value(unquoted),
    }
}

fn cast_numeric_value(value: &str) -> Value {
    if value.contains('.') {
        if let Some(n) = value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .and_then(serde_json::Number::from_f64)
        {
            return Value::Number(n);
        }
    } else if let Ok(n) = value.parse::<i64>() {
        return Value::Number(n.into());
    }
    Value::String(value.to_owned())
}

fn strip_wrapping_quotes(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        return &value[1..value.len() - 1];
    }
    value
}
