use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use tsm_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in effective_fields(&config) {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

type Field = (&'static str, String, &'static [&'static str]);

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    (key, value, env_keys)
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let chain: Vec<&str> =
        config.workflow.approval_chain.iter().map(|role| role.as_str()).collect();

    vec![
        field("database.url", config.database.url.clone(), &["TSM_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["TSM_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["TSM_DATABASE_TIMEOUT_SECS"],
        ),
        field("server.bind_address", config.server.bind_address.clone(), &["TSM_SERVER_BIND_ADDRESS"]),
        field("server.port", config.server.port.to_string(), &["TSM_SERVER_PORT"]),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["TSM_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field("workflow.approval_chain", chain.join(","), &["TSM_WORKFLOW_APPROVAL_CHAIN"]),
        field(
            "workflow.inspection_role",
            config.workflow.inspection_role.as_str().to_string(),
            &["TSM_WORKFLOW_INSPECTION_ROLE"],
        ),
        field(
            "workflow.action_delay_ms",
            config.workflow.action_delay_ms.to_string(),
            &["TSM_WORKFLOW_ACTION_DELAY_MS"],
        ),
        field(
            "workflow.sweep_interval_secs",
            config.workflow.sweep_interval_secs.to_string(),
            &["TSM_WORKFLOW_SWEEP_INTERVAL_SECS"],
        ),
        field(
            "workflow.annotation",
            config.workflow.annotation.as_str().to_string(),
            &["TSM_WORKFLOW_ANNOTATION"],
        ),
        field(
            "rates.rate_per_unit_area",
            config.rates.rate_per_unit_area.to_string(),
            &["TSM_RATES_RATE_PER_UNIT_AREA"],
        ),
        field("rates.currency", config.rates.currency.clone(), &["TSM_RATES_CURRENCY"]),
        field(
            "rates.unit_conversion_factor",
            config.rates.unit_conversion_factor.to_string(),
            &["TSM_RATES_UNIT_CONVERSION_FACTOR"],
        ),
        field("rates.linear_unit", config.rates.linear_unit.clone(), &[]),
        field("rates.area_unit", config.rates.area_unit.clone(), &[]),
        field("logging.level", config.logging.level.clone(), &["TSM_LOGGING_LEVEL", "TSM_LOG_LEVEL"]),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["TSM_LOGGING_FORMAT", "TSM_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("tsm.toml"), PathBuf::from("config/tsm.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toml::Value;
    use tsm_core::config::AppConfig;

    use super::{contains_path, effective_fields, field_source};

    #[test]
    fn file_source_is_reported_for_keys_present_in_the_document() {
        let doc: Value = "[workflow]\ninspection_role = \"wcm\"".parse().expect("toml");

        assert!(contains_path(&doc, "workflow.inspection_role"));
        assert!(!contains_path(&doc, "workflow.approval_chain"));
        assert_eq!(
            field_source(
                "workflow.inspection_role",
                &["TSM_TEST_UNSET_KEY"],
                Some(&doc),
                Some(Path::new("tsm.toml"))
            ),
            "file (tsm.toml)"
        );
        assert_eq!(field_source("rates.area_unit", &[], Some(&doc), None), "default");
    }

    #[test]
    fn effective_fields_render_default_chain() {
        let fields = effective_fields(&AppConfig::default());
        let chain = fields
            .iter()
            .find(|(key, _, _)| *key == "workflow.approval_chain")
            .map(|(_, value, _)| value.clone());

        assert_eq!(chain.as_deref(), Some("bum,wcm,mfg_fm,ie_plant"));
        assert_eq!(fields.len(), 18);
    }
}
