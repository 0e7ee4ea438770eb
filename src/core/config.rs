//! Configuration structures for closed-test-publisher
//!
//! The on-disk/env/CLI layers are all [`PublisherConfig`] values with every
//! field optional. After merging, [`PublisherConfig::resolve`] validates the
//! result into [`PublishSettings`], which is what the pipeline consumes.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::PublishError;
use crate::security::credentials::CredentialSource;

/// Current configuration schema version
pub const CONFIG_VERSION: &str = "1.0";

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default length of the open-test window attached to a test group
pub const DEFAULT_OPEN_TEST_DAYS: u32 = 30;

/// Default release-type code
pub const DEFAULT_RELEASE_TYPE: u32 = 6;

/// Default test-type code
pub const DEFAULT_TEST_TYPE: u32 = 3;

/// Default directory holding the WhatToTest files
pub const DEFAULT_DESCRIPTION_DIR: &str = "APPTest";

/// Default description language (selects `WhatToTest.<language>.txt`)
pub const DEFAULT_LANGUAGE: &str = "zh-Hans";

/// Default invite code validity in days
pub const DEFAULT_INVITE_VALID_DAYS: u32 = 7;

/// Default number of testers one invite code admits
pub const DEFAULT_INVITE_LIMIT: u32 = 1000;

/// Commented starter configuration written by `init`
pub const CONFIG_TEMPLATE: &str = r#"# closed-test-publisher configuration
version: "1.0"

api:
  baseUrl: https://connect-api.cloud.huawei.com
  timeoutSecs: 120

app:
  appId: "${CTP_APP_ID}"

artifact:
  path: build/outputs/default/entry-default-signed.app
  releaseType: 6

# Either clientId/clientSecret or a service account (file or inline JSON)
credentials:
  serviceAccountFile: agc-apiclient.json
  # clientId: "${CTP_CLIENT_ID}"
  # clientSecret: "${CTP_CLIENT_SECRET}"

testing:
  testType: 3
  descriptionDir: APPTest
  language: zh-Hans
  # Overrides the WhatToTest file when set
  # testDesc: "Check login and payment"
  # groupName: Beta
  openTestDays: 30

# Enabled unless set to false; requires testing.groupName
inviteCode:
  enabled: true
  validityDays: 7
  inviteLimit: 1000

security:
  envVarExpansion:
    enabled: true
    allowedPrefixes: ["CTP_"]
"#;

/// Root configuration object
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    /// Schema version
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub app: Option<AppConfig>,

    #[serde(default)]
    pub artifact: Option<ArtifactConfig>,

    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,

    #[serde(default)]
    pub testing: Option<TestingConfig>,

    #[serde(default)]
    pub invite_code: Option<InviteCodeConfig>,

    #[serde(default)]
    pub security: Option<SecurityConfig>,
}

/// Vendor API endpoint settings
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Target application
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app_id: Option<String>,
}

/// Build artifact to publish
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactConfig {
    pub path: Option<PathBuf>,
    /// Numeric release-type code sent with the upload ticket and test version
    pub release_type: Option<u32>,
}

/// Credential sources; exactly one of client credentials or a service account
#[derive(Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub service_account_file: Option<PathBuf>,
    /// Inline service-account JSON (usually `${SECRET_VAR}`)
    pub service_account_json: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("CredentialsConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("service_account_file", &self.service_account_file)
            .field("service_account_json", &redacted(&self.service_account_json))
            .finish()
    }
}

/// Closed-testing settings
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestingConfig {
    pub test_type: Option<u32>,
    /// Directory holding `WhatToTest.<language>.txt`
    pub description_dir: Option<PathBuf>,
    pub language: Option<String>,
    /// Literal test description; replaces the WhatToTest file when set
    pub test_desc: Option<String>,
    /// Tester group to find or create; no group step when absent
    pub group_name: Option<String>,
    pub open_test_days: Option<u32>,
}

/// Invitation code generation
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InviteCodeConfig {
    pub enabled: Option<bool>,
    pub validity_days: Option<u32>,
    pub invite_limit: Option<u32>,
}

/// Security configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    pub env_var_expansion: Option<EnvVarExpansionConfig>,
}

/// `${VAR}` expansion settings
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarExpansionConfig {
    pub enabled: Option<bool>,
    /// Only variables starting with one of these prefixes are expanded
    pub allowed_prefixes: Option<Vec<String>>,
}

/// Resolved invite code options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteCodeSettings {
    pub validity_days: u32,
    pub invite_limit: u32,
}

impl Default for InviteCodeSettings {
    fn default() -> Self {
        Self {
            validity_days: DEFAULT_INVITE_VALID_DAYS,
            invite_limit: DEFAULT_INVITE_LIMIT,
        }
    }
}

/// Fully validated settings for one publishing run
#[derive(Debug)]
pub struct PublishSettings {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub app_id: String,
    pub artifact_path: PathBuf,
    pub release_type: u32,
    pub test_type: u32,
    pub credential_source: CredentialSource,
    pub description_dir: PathBuf,
    pub language: String,
    pub test_desc: Option<String>,
    pub group_name: Option<String>,
    pub open_test_days: u32,
    pub invite_code: Option<InviteCodeSettings>,
}

impl PublisherConfig {
    /// Validate the merged configuration into run settings
    pub fn resolve(self) -> Result<PublishSettings, PublishError> {
        if let Some(version) = &self.version
            && version != CONFIG_VERSION
        {
            return Err(PublishError::Config(format!(
                "unsupported config version {} (expected {})",
                version, CONFIG_VERSION
            )));
        }

        let api = self.api.unwrap_or_default();
        let api_base_url = non_empty(api.base_url)
            .ok_or_else(|| PublishError::Config("api.baseUrl is required".to_string()))?;
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(PublishError::Config(format!(
                "api.baseUrl must be an http(s) URL: {}",
                api_base_url
            )));
        }

        let app_id = self
            .app
            .and_then(|app| non_empty(app.app_id))
            .ok_or_else(|| PublishError::Config("app.appId is required".to_string()))?;

        let artifact = self.artifact.unwrap_or_default();
        let artifact_path = artifact
            .path
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| PublishError::Config("artifact.path is required".to_string()))?;

        let credential_source =
            CredentialSource::from_config(self.credentials.unwrap_or_default())?;

        let testing = self.testing.unwrap_or_default();
        let open_test_days = testing.open_test_days.unwrap_or(DEFAULT_OPEN_TEST_DAYS);
        if open_test_days == 0 {
            return Err(PublishError::Config(
                "testing.openTestDays must be at least 1".to_string(),
            ));
        }

        // Invite codes are generated unless explicitly disabled
        let invite = self.invite_code.unwrap_or_default();
        let invite_code = match invite.enabled {
            Some(false) => None,
            _ => {
                let defaults = InviteCodeSettings::default();
                let settings = InviteCodeSettings {
                    validity_days: invite.validity_days.unwrap_or(defaults.validity_days),
                    invite_limit: invite.invite_limit.unwrap_or(defaults.invite_limit),
                };
                if settings.validity_days == 0 || settings.invite_limit == 0 {
                    return Err(PublishError::Config(
                        "inviteCode.validityDays and inviteCode.inviteLimit must be positive"
                            .to_string(),
                    ));
                }
                Some(settings)
            }
        };

        Ok(PublishSettings {
            api_base_url,
            request_timeout: Duration::from_secs(
                api.timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            app_id,
            artifact_path,
            release_type: artifact.release_type.unwrap_or(DEFAULT_RELEASE_TYPE),
            test_type: testing.test_type.unwrap_or(DEFAULT_TEST_TYPE),
            credential_source,
            description_dir: testing
                .description_dir
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DESCRIPTION_DIR)),
            language: non_empty(testing.language).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            test_desc: non_empty(testing.test_desc),
            group_name: non_empty(testing.group_name),
            open_test_days,
            invite_code,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
