//! Configuration loader with JSON/TOML parsing and environment variable overrides

use super::schema::AppConfig;
use crate::domain::errors::ImmunizationError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Picks the format from the file extension; anything but `.toml` is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Loads configuration from a JSON or TOML file
///
/// This function:
/// 1. Reads the file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses it into [`AppConfig`]
/// 4. Applies environment variable overrides (`IMMUNIZATION_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`ImmunizationError::Configuration`] if the file is missing or
/// unreadable, a referenced variable is unset, a required key is absent, or
/// validation fails.
///
/// # Examples
///
/// ```no_run
/// use immunization_etl::config::loader::load_config;
///
/// let config = load_config("config/config.json").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ImmunizationError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ImmunizationError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let format = ConfigFormat::from_path(path);
    let mut config = parse_config(&contents, format)?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ImmunizationError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Parses configuration text after `${VAR}` substitution, without validating it
pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<AppConfig> {
    let contents = substitute_env_vars(contents, format)?;

    match format {
        ConfigFormat::Json => serde_json::from_str(&contents).map_err(|e| {
            ImmunizationError::Configuration(format!("Failed to parse JSON: {}", e))
        }),
        ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| {
            ImmunizationError::Configuration(format!("Failed to parse TOML: {}", e))
        }),
    }
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// TOML comment lines are left untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str, format: ConfigFormat) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ImmunizationError::Other(format!("invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if format == ConfigFormat::Toml && line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ImmunizationError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the `IMMUNIZATION_*` prefix
///
/// Variables follow the pattern `IMMUNIZATION_<SECTION>_<KEY>`, for example
/// `IMMUNIZATION_API_AISR_API_BASE_URL` or `IMMUNIZATION_PATHS_OUTPUT_FOLDER`.
fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    if let Ok(val) = std::env::var("IMMUNIZATION_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    if let Ok(val) = std::env::var("IMMUNIZATION_API_AUTH_BASE_URL") {
        config.api.auth_base_url = val;
    }
    if let Ok(val) = std::env::var("IMMUNIZATION_API_AISR_API_BASE_URL") {
        config.api.aisr_api_base_url = val;
    }
    if let Ok(val) = std::env::var("IMMUNIZATION_API_TLS_VERIFY") {
        config.api.tls_verify = parse_override("IMMUNIZATION_API_TLS_VERIFY", &val)?;
    }
    if let Ok(val) = std::env::var("IMMUNIZATION_API_CONCURRENCY") {
        config.api.concurrency = parse_override("IMMUNIZATION_API_CONCURRENCY", &val)?;
    }
    if let Ok(val) = std::env::var("IMMUNIZATION_API_TIMEOUT_SECONDS") {
        config.api.timeout_seconds = parse_override("IMMUNIZATION_API_TIMEOUT_SECONDS", &val)?;
    }
    if let Ok(val) = std::env::var("IMMUNIZATION_API_LATEST_RESULT_ONLY") {
        config.api.latest_result_only =
            parse_override("IMMUNIZATION_API_LATEST_RESULT_ONLY", &val)?;
    }

    if let Ok(val) = std::env::var("IMMUNIZATION_PATHS_OUTPUT_FOLDER") {
        config.paths.output_folder = val.into();
    }
    if let Ok(val) = std::env::var("IMMUNIZATION_PATHS_LOGS_FOLDER") {
        config.paths.logs_folder = val.into();
    }
    if let Ok(val) = std::env::var("IMMUNIZATION_PATHS_RAW_FOLDER") {
        config.paths.raw_folder = Some(val.into());
    }

    if let Ok(val) = std::env::var("IMMUNIZATION_INCREMENTAL_ENABLED") {
        config.incremental.enabled = parse_override("IMMUNIZATION_INCREMENTAL_ENABLED", &val)?;
    }

    if let Ok(val) = std::env::var("IMMUNIZATION_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("IMMUNIZATION_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("IMMUNIZATION_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ImmunizationError::Configuration(format!("Invalid value '{value}' for {name}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const JSON_CONFIG: &str = r#"{
  "api": {
    "auth_base_url": "https://authenticator4.web.health.state.mn.us",
    "aisr_api_base_url": "https://aisr-api.web.health.state.mn.us"
  },
  "paths": {
    "output_folder": "/tmp/immunization/output",
    "logs_folder": "/tmp/immunization/logs"
  },
  "schools": [
    {
      "name": "Friendly Hills Mid",
      "id": "2542",
      "classification": "N",
      "email": "nurse@example.org",
      "bulk_query_file": "/data/friendly_hills.csv"
    }
  ]
}"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json);
    }

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("IMMUNIZATION_TEST_SUB_VAR", "test_value");
        let input = "\"email\": \"${IMMUNIZATION_TEST_SUB_VAR}\"";
        let result = substitute_env_vars(input, ConfigFormat::Json).unwrap();
        assert_eq!(result, "\"email\": \"test_value\"\n");
        std::env::remove_var("IMMUNIZATION_TEST_SUB_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("IMMUNIZATION_TEST_MISSING_VAR");
        let input = "\"email\": \"${IMMUNIZATION_TEST_MISSING_VAR}\"";
        let err = substitute_env_vars(input, ConfigFormat::Json).unwrap_err();
        assert!(err.to_string().contains("IMMUNIZATION_TEST_MISSING_VAR"));
    }

    #[test]
    fn test_toml_comments_are_not_substituted() {
        std::env::remove_var("IMMUNIZATION_TEST_COMMENT_VAR");
        let input = "# email = \"${IMMUNIZATION_TEST_COMMENT_VAR}\"";
        assert!(substitute_env_vars(input, ConfigFormat::Toml).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.json");
        assert!(matches!(result, Err(ImmunizationError::Configuration(_))));
    }

    #[test]
    fn test_load_config_json() {
        let mut temp_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        temp_file.write_all(JSON_CONFIG.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.schools.len(), 1);
        assert_eq!(config.schools[0].id.as_str(), "2542");
        assert_eq!(config.api.iddis, "0197");
        assert_eq!(config.transform.columns.len(), 6);
    }

    #[test]
    fn test_parse_config_missing_key() {
        let err = parse_config(r#"{"api": {}}"#, ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ImmunizationError::Configuration(_)));
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_content = r#"
[api]
auth_base_url = "https://auth.example.org"
aisr_api_base_url = "https://aisr.example.org"

[paths]
output_folder = "out"
logs_folder = "logs"

[[schools]]
name = "Garlough Elementary"
id = "2543"
bulk_query_file = "garlough.csv"
"#;
        let config = parse_config(toml_content, ConfigFormat::Toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.schools[0].name, "Garlough Elementary");
    }
}
