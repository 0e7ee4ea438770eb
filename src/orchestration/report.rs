//! Publish report and CI outputs
//!
//! Features:
//! - JSON report of a successful run (`--report`)
//! - `key=value` step outputs appended to `$GITHUB_OUTPUT` while the run progresses
//! - Markdown summary appended to `$GITHUB_STEP_SUMMARY`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::api::endpoints::InviteCode;
use crate::core::error::PublishError;
use crate::core::state_machine::StageTransition;
use crate::core::traits::OutputSink;

pub const OUTPUT_VERSION_ID: &str = "version-id";
pub const OUTPUT_PKG_VERSION: &str = "pkg-version";
pub const OUTPUT_GROUP_ID: &str = "group-id";
pub const OUTPUT_INVITATION_CODE: &str = "invitation-code";
pub const OUTPUT_INVITATION_CODE_ID: &str = "invitation-code-id";

/// Step outputs appended to a `$GITHUB_OUTPUT` file
#[derive(Debug, Clone)]
pub struct GithubOutputFile {
    path: PathBuf,
}

impl GithubOutputFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sink for the file named by `GITHUB_OUTPUT`, if set
    pub fn from_env() -> Option<Self> {
        std::env::var("GITHUB_OUTPUT")
            .ok()
            .filter(|path| !path.is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl OutputSink for GithubOutputFile {
    async fn set_output(&self, key: &str, value: &str) -> Result<(), PublishError> {
        debug!(key, "writing step output");
        append(&self.path, &format!("{}={}\n", key, value)).await
    }
}

/// Result of a successful publishing run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub run_id: String,
    pub app_id: String,
    pub version_id: String,
    pub package_id: String,
    pub group_id: Option<String>,
    pub invite_code: Option<InviteCode>,
    pub warnings: Vec<String>,
    pub stages: Vec<StageTransition>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl PublishReport {
    pub fn to_json(&self) -> Result<String, PublishError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PublishError::Config(format!("failed to serialize report: {}", e)))
    }

    /// Write the report as pretty JSON, creating parent directories
    pub async fn write_json(&self, path: &Path) -> Result<(), PublishError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| PublishError::io(dir, e))?;
        }

        fs::write(path, self.to_json()?)
            .await
            .map_err(|e| PublishError::io(path, e))
    }

    pub fn markdown_summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push("## Closed test published\n".to_string());
        lines.push(format!("- **App**: {}", self.app_id));
        lines.push(format!("- **Test version**: {}", self.version_id));
        lines.push(format!("- **Package**: {}", self.package_id));
        if let Some(group_id) = &self.group_id {
            lines.push(format!("- **Test group**: {}", group_id));
        }
        if let Some(invite) = &self.invite_code {
            lines.push(format!("- **Invite code**: `{}`", invite.invitation_code));
        }
        lines.push(format!(
            "- **Duration**: {:.1}s",
            self.duration_ms as f64 / 1000.0
        ));

        if !self.warnings.is_empty() {
            lines.push("\n### Warnings\n".to_string());
            for warning in &self.warnings {
                lines.push(format!("- {}", warning));
            }
        }

        lines.push(String::new());
        lines.join("\n")
    }

    /// Append the markdown summary to a `$GITHUB_STEP_SUMMARY` file
    pub async fn append_step_summary(&self, path: &Path) -> Result<(), PublishError> {
        append(path, &self.markdown_summary()).await
    }
}

async fn append(path: &Path, content: &str) -> Result<(), PublishError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| PublishError::io(path, e))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| PublishError::io(path, e))?;
    file.flush().await.map_err(|e| PublishError::io(path, e))
}
