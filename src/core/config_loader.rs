//! Configuration file loader for closed-test-publisher
//!
//! This module provides configuration loading, merging and `${VAR}` expansion.

use super::config::*;
use crate::core::error::PublishError;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration file name looked up in the project directory
pub const CONFIG_FILENAME: &str = ".closed-test-publisher.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Project path to look for the config file in
    pub project_path: PathBuf,

    /// Explicit config file; must exist when given
    pub config_file: Option<PathBuf>,

    /// CLI arguments (highest priority)
    pub cli_args: Option<PublisherConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables (`CTP_*`)
    /// 3. Config file (`--config` or `./.closed-test-publisher.yaml`)
    pub async fn load(options: ConfigLoadOptions) -> Result<PublisherConfig, PublishError> {
        let mut configs: Vec<PublisherConfig> = Vec::new();

        // 3. Config file
        if let Some(file_config) =
            Self::load_file_config(&options.project_path, options.config_file.as_deref()).await?
        {
            configs.push(file_config);
        }

        // 2. Environment variables
        if let Some(env_config) = Self::load_env_config(&options.env)? {
            configs.push(env_config);
        }

        // 1. CLI arguments (highest priority)
        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged = Self::merge_configs(configs);

        Self::expand_env_vars(merged, &options.env)
    }

    async fn load_file_config(
        project_path: &Path,
        explicit: Option<&Path>,
    ) -> Result<Option<PublisherConfig>, PublishError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (project_path.join(CONFIG_FILENAME), false),
        };

        if !path.exists() {
            if required {
                return Err(PublishError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(None);
        }

        debug!(path = %path.display(), "loading config file");
        Self::load_config_file(&path).await.map(Some)
    }

    /// Load configuration from a YAML file
    pub async fn load_config_file(file_path: &Path) -> Result<PublisherConfig, PublishError> {
        let content = fs::read_to_string(file_path).await.map_err(|e| {
            PublishError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::parse(&content)
    }

    /// Parse YAML configuration text; an empty document is an empty config
    pub fn parse(content: &str) -> Result<PublisherConfig, PublishError> {
        if content.trim().is_empty() {
            return Ok(PublisherConfig::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| PublishError::Config(format!("Failed to parse YAML config: {}", e)))
    }

    /// Load configuration from environment variables
    ///
    /// Numeric and boolean variables that do not parse are configuration errors.
    fn load_env_config(
        env: &HashMap<String, String>,
    ) -> Result<Option<PublisherConfig>, PublishError> {
        let get = |name: &str| env.get(name).filter(|v| !v.is_empty()).cloned();
        let get_u32 = |name: &str| -> Result<Option<u32>, PublishError> {
            get(name)
                .map(|value| {
                    value.trim().parse::<u32>().map_err(|_| {
                        PublishError::Config(format!("{} must be a non-negative integer: {}", name, value))
                    })
                })
                .transpose()
        };
        let mut config = PublisherConfig::default();
        let mut has_changes = false;

        if let Some(base_url) = get("CTP_API_URL") {
            config.api = Some(ApiConfig {
                base_url: Some(base_url),
                timeout_secs: None,
            });
            has_changes = true;
        }

        if let Some(app_id) = get("CTP_APP_ID") {
            config.app = Some(AppConfig {
                app_id: Some(app_id),
            });
            has_changes = true;
        }

        let artifact = ArtifactConfig {
            path: get("CTP_ARTIFACT").map(PathBuf::from),
            release_type: get_u32("CTP_RELEASE_TYPE")?,
        };
        if artifact != ArtifactConfig::default() {
            config.artifact = Some(artifact);
            has_changes = true;
        }

        let credentials = CredentialsConfig {
            client_id: get("CTP_CLIENT_ID"),
            client_secret: get("CTP_CLIENT_SECRET"),
            service_account_file: get("CTP_SERVICE_ACCOUNT_FILE").map(PathBuf::from),
            service_account_json: get("CTP_SERVICE_ACCOUNT_JSON"),
        };
        if credentials != CredentialsConfig::default() {
            config.credentials = Some(credentials);
            has_changes = true;
        }

        let testing = TestingConfig {
            test_type: get_u32("CTP_TEST_TYPE")?,
            description_dir: get("CTP_DESCRIPTION_DIR").map(PathBuf::from),
            language: get("CTP_LANGUAGE"),
            test_desc: get("CTP_TEST_DESC"),
            group_name: get("CTP_GROUP_NAME"),
            ..Default::default()
        };
        if testing != TestingConfig::default() {
            config.testing = Some(testing);
            has_changes = true;
        }

        let invite_code = InviteCodeConfig {
            enabled: get("CTP_GENERATE_INVITE_CODE")
                .map(|value| parse_flag("CTP_GENERATE_INVITE_CODE", &value))
                .transpose()?,
            validity_days: get_u32("CTP_INVITE_CODE_VALID_DAYS")?,
            invite_limit: get_u32("CTP_INVITE_CODE_INVITE_LIMIT")?,
        };
        if invite_code != InviteCodeConfig::default() {
            config.invite_code = Some(invite_code);
            has_changes = true;
        }

        Ok(if has_changes { Some(config) } else { None })
    }

    /// Merge multiple configurations; later entries win field by field
    pub fn merge_configs(configs: Vec<PublisherConfig>) -> PublisherConfig {
        let mut result = PublisherConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target
    fn merge_into(target: &mut PublisherConfig, source: PublisherConfig) {
        overlay(&mut target.version, source.version);

        if let Some(api) = source.api {
            let t = target.api.get_or_insert_with(Default::default);
            overlay(&mut t.base_url, api.base_url);
            overlay(&mut t.timeout_secs, api.timeout_secs);
        }

        if let Some(app) = source.app {
            let t = target.app.get_or_insert_with(Default::default);
            overlay(&mut t.app_id, app.app_id);
        }

        if let Some(artifact) = source.artifact {
            let t = target.artifact.get_or_insert_with(Default::default);
            overlay(&mut t.path, artifact.path);
            overlay(&mut t.release_type, artifact.release_type);
        }

        // Credentials replace as a unit so a higher layer can switch strategy
        if let Some(credentials) = source.credentials
            && credentials != CredentialsConfig::default()
        {
            target.credentials = Some(credentials);
        }

        if let Some(testing) = source.testing {
            let t = target.testing.get_or_insert_with(Default::default);
            overlay(&mut t.test_type, testing.test_type);
            overlay(&mut t.description_dir, testing.description_dir);
            overlay(&mut t.language, testing.language);
            overlay(&mut t.test_desc, testing.test_desc);
            overlay(&mut t.group_name, testing.group_name);
            overlay(&mut t.open_test_days, testing.open_test_days);
        }

        if let Some(invite) = source.invite_code {
            let t = target.invite_code.get_or_insert_with(Default::default);
            overlay(&mut t.enabled, invite.enabled);
            overlay(&mut t.validity_days, invite.validity_days);
            overlay(&mut t.invite_limit, invite.invite_limit);
        }

        if source.security.is_some() {
            target.security = source.security;
        }
    }

    /// Expand environment variables in string settings
    ///
    /// Only `${VAR_NAME}` references are expanded; a referenced variable that
    /// is unset or outside `allowedPrefixes` is a configuration error.
    fn expand_env_vars(
        mut config: PublisherConfig,
        env: &HashMap<String, String>,
    ) -> Result<PublisherConfig, PublishError> {
        let expansion = config
            .security
            .as_ref()
            .and_then(|s| s.env_var_expansion.clone())
            .unwrap_or_default();

        if !expansion.enabled.unwrap_or(true) {
            return Ok(config);
        }

        let allowed_prefixes = expansion.allowed_prefixes;
        let expand = |value: &mut Option<String>| -> Result<(), PublishError> {
            if let Some(text) = value {
                *text = Self::expand_string(text, env, &allowed_prefixes)?;
            }
            Ok(())
        };

        if let Some(api) = &mut config.api {
            expand(&mut api.base_url)?;
        }
        if let Some(app) = &mut config.app {
            expand(&mut app.app_id)?;
        }
        if let Some(credentials) = &mut config.credentials {
            expand(&mut credentials.client_id)?;
            expand(&mut credentials.client_secret)?;
            expand(&mut credentials.service_account_json)?;
        }
        if let Some(testing) = &mut config.testing {
            expand(&mut testing.group_name)?;
            expand(&mut testing.language)?;
            expand(&mut testing.test_desc)?;
        }

        Ok(config)
    }

    /// Expand environment variables in a single string
    pub fn expand_string(
        input: &str,
        env: &HashMap<String, String>,
        allowed_prefixes: &Option<Vec<String>>,
    ) -> Result<String, PublishError> {
        let env_var_regex = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| PublishError::Config(format!("invalid expansion pattern: {}", e)))?;

        let mut result = input.to_string();
        for cap in env_var_regex.captures_iter(input) {
            let var_name = &cap[1];

            if let Some(prefixes) = allowed_prefixes
                && !prefixes.iter().any(|prefix| var_name.starts_with(prefix))
            {
                return Err(PublishError::Config(format!(
                    "environment variable {} is not allowed by allowedPrefixes",
                    var_name
                )));
            }

            let value = env.get(var_name).ok_or_else(|| {
                PublishError::Config(format!("environment variable {} is not set", var_name))
            })?;
            result = result.replace(&format!("${{{}}}", var_name), value);
        }

        Ok(result)
    }
}

/// Parse a `true`/`false` switch (case-insensitive)
fn parse_flag(name: &str, value: &str) -> Result<bool, PublishError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(PublishError::Config(format!(
            "{} must be true or false: {}",
            name, value
        ))),
    }
}

fn overlay<T>(target: &mut Option<T>, source: Option<T>) {
    if source.is_some() {
        *target = source;
    }
}
