use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::AnnotationMode;
use crate::billing::RateConfig;
use crate::chain::ApprovalChain;
use crate::domain::role::Role;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub rates: RateConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub approval_chain: Vec<Role>,
    pub inspection_role: Role,
    pub action_delay_ms: u64,
    pub sweep_interval_secs: u64,
    pub annotation: AnnotationMode,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub action_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tsm.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            workflow: WorkflowConfig {
                approval_chain: ApprovalChain::default().roles().to_vec(),
                inspection_role: Role::IePlant,
                action_delay_ms: 0,
                sweep_interval_secs: 60,
                annotation: AnnotationMode::None,
            },
            rates: RateConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl WorkflowConfig {
    pub fn chain(&self) -> Result<ApprovalChain, ConfigError> {
        ApprovalChain::new(self.approval_chain.clone())
            .map_err(|error| ConfigError::Validation(format!("workflow.approval_chain: {error}")))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tsm.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(chain) = workflow.approval_chain {
                self.workflow.approval_chain = chain
                    .iter()
                    .map(|role| parse_role("workflow.approval_chain", role))
                    .collect::<Result<_, _>>()?;
            }
            if let Some(role) = workflow.inspection_role {
                self.workflow.inspection_role = parse_role("workflow.inspection_role", &role)?;
            }
            if let Some(action_delay_ms) = workflow.action_delay_ms {
                self.workflow.action_delay_ms = action_delay_ms;
            }
            if let Some(sweep_interval_secs) = workflow.sweep_interval_secs {
                self.workflow.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(annotation) = workflow.annotation {
                self.workflow.annotation = annotation;
            }
        }

        if let Some(rates) = patch.rates {
            if let Some(rate) = rates.rate_per_unit_area {
                self.rates.rate_per_unit_area = parse_decimal("rates.rate_per_unit_area", &rate)?;
            }
            if let Some(currency) = rates.currency {
                self.rates.currency = currency;
            }
            if let Some(factor) = rates.unit_conversion_factor {
                self.rates.unit_conversion_factor =
                    parse_decimal("rates.unit_conversion_factor", &factor)?;
            }
            if let Some(linear_unit) = rates.linear_unit {
                self.rates.linear_unit = linear_unit;
            }
            if let Some(area_unit) = rates.area_unit {
                self.rates.area_unit = area_unit;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TSM_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TSM_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TSM_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TSM_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TSM_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TSM_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TSM_SERVER_PORT") {
            self.server.port = parse_u16("TSM_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TSM_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TSM_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TSM_WORKFLOW_APPROVAL_CHAIN") {
            self.workflow.approval_chain = value
                .split(',')
                .map(|role| parse_env_role("TSM_WORKFLOW_APPROVAL_CHAIN", role))
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = read_env("TSM_WORKFLOW_INSPECTION_ROLE") {
            self.workflow.inspection_role = parse_env_role("TSM_WORKFLOW_INSPECTION_ROLE", &value)?;
        }
        if let Some(value) = read_env("TSM_WORKFLOW_ACTION_DELAY_MS") {
            self.workflow.action_delay_ms = parse_u64("TSM_WORKFLOW_ACTION_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("TSM_WORKFLOW_SWEEP_INTERVAL_SECS") {
            self.workflow.sweep_interval_secs =
                parse_u64("TSM_WORKFLOW_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("TSM_WORKFLOW_ANNOTATION") {
            self.workflow.annotation = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "TSM_WORKFLOW_ANNOTATION".to_string(),
                value,
            })?;
        }

        if let Some(value) = read_env("TSM_RATES_RATE_PER_UNIT_AREA") {
            self.rates.rate_per_unit_area = parse_env_decimal("TSM_RATES_RATE_PER_UNIT_AREA", &value)?;
        }
        if let Some(value) = read_env("TSM_RATES_CURRENCY") {
            self.rates.currency = value;
        }
        if let Some(value) = read_env("TSM_RATES_UNIT_CONVERSION_FACTOR") {
            self.rates.unit_conversion_factor =
                parse_env_decimal("TSM_RATES_UNIT_CONVERSION_FACTOR", &value)?;
        }

        let log_level = read_env("TSM_LOGGING_LEVEL").or_else(|| read_env("TSM_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TSM_LOGGING_FORMAT").or_else(|| read_env("TSM_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(action_delay_ms) = overrides.action_delay_ms {
            self.workflow.action_delay_ms = action_delay_ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_workflow(&self.workflow)?;
        validate_rates(&self.rates)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tsm.toml"), PathBuf::from("config/tsm.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    workflow.chain()?;

    if !workflow.inspection_role.is_operational() {
        return Err(ConfigError::Validation(format!(
            "workflow.inspection_role `{}` must be an operational role",
            workflow.inspection_role
        )));
    }

    if workflow.action_delay_ms > 10_000 {
        return Err(ConfigError::Validation(
            "workflow.action_delay_ms must be in range 0..=10000".to_string(),
        ));
    }

    if workflow.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "workflow.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_rates(rates: &RateConfig) -> Result<(), ConfigError> {
    if rates.rate_per_unit_area.is_sign_negative() {
        return Err(ConfigError::Validation(
            "rates.rate_per_unit_area must not be negative".to_string(),
        ));
    }

    if rates.unit_conversion_factor <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "rates.unit_conversion_factor must be greater than zero".to_string(),
        ));
    }

    let currency = rates.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ConfigError::Validation(
            "rates.currency must be a three-letter uppercase code".to_string(),
        ));
    }

    if rates.linear_unit.trim().is_empty() || rates.area_unit.trim().is_empty() {
        return Err(ConfigError::Validation("rates unit labels must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_role(field: &str, value: &str) -> Result<Role, ConfigError> {
    value
        .parse::<Role>()
        .map_err(|_| ConfigError::Validation(format!("{field} has unknown role `{value}`")))
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim())
        .map_err(|_| ConfigError::Validation(format!("{field} must be a decimal, got `{value}`")))
}

fn parse_env_role(key: &str, value: &str) -> Result<Role, ConfigError> {
    value.parse::<Role>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_env_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    workflow: Option<WorkflowPatch>,
    rates: Option<RatesPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    approval_chain: Option<Vec<String>>,
    inspection_role: Option<String>,
    action_delay_ms: Option<u64>,
    sweep_interval_secs: Option<u64>,
    annotation: Option<AnnotationMode>,
}

#[derive(Debug, Default, Deserialize)]
struct RatesPatch {
    rate_per_unit_area: Option<String>,
    currency: Option<String>,
    unit_conversion_factor: Option<String>,
    linear_unit: Option<String>,
    area_unit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
