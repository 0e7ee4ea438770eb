//! Artifact digest and presigned upload

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::api::endpoints::UploadTicket;
use crate::core::error::PublishError;
use crate::core::traits::{HttpMethod, HttpRequest, Transport};

const CONTENT_LENGTH_HEADER: &str = "content-length";

/// Package extensions accepted by the distribution service
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["hap", "app"];

/// Ensure the artifact exists and is a `.hap` or `.app` package
///
/// Runs before authentication so a wrong path never reaches the network.
pub async fn check_artifact(path: &Path) -> Result<(), PublishError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            return Err(PublishError::Config(format!(
                "artifact is not a file: {}",
                path.display()
            )));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PublishError::Config(format!(
                "artifact not found: {}",
                path.display()
            )));
        }
        Err(e) => return Err(PublishError::io(path, e)),
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(PublishError::Config(format!(
            "unsupported artifact format \"{}\": only .hap and .app are supported",
            path.display()
        )));
    }
    Ok(())
}

/// Build artifact read fully into memory
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`
    pub sha256: String,
}

impl Artifact {
    /// Read the artifact and compute its digest
    pub async fn load(path: &Path) -> Result<Self, PublishError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PublishError::io(path, e))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PublishError::Config(format!("artifact path has no file name: {}", path.display()))
            })?;

        let sha256 = sha256_hex(&bytes);
        debug!(file = %file_name, size = bytes.len(), sha256 = %sha256, "artifact digested");

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            bytes,
            sha256,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Send the artifact to a presigned upload target
///
/// The request carries exactly the ticket's headers, with `content-length`
/// set to the artifact size. No bearer token is attached.
pub async fn upload_artifact(
    transport: &dyn Transport,
    ticket: &UploadTicket,
    artifact: &Artifact,
) -> Result<(), PublishError> {
    let method = HttpMethod::parse(&ticket.method).ok_or_else(|| {
        PublishError::decode(
            format!("unsupported upload method {}", ticket.method),
            &ticket.method,
        )
    })?;

    let mut headers: Vec<(String, String)> = ticket
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let size = artifact.size().to_string();
    match headers
        .iter_mut()
        .find(|(name, _)| name.eq_ignore_ascii_case(CONTENT_LENGTH_HEADER))
    {
        Some(slot) => slot.1 = size,
        None => headers.push((CONTENT_LENGTH_HEADER.to_string(), size)),
    }

    let response = transport
        .send(HttpRequest {
            method,
            url: ticket.url.clone(),
            headers,
            body: Some(artifact.bytes.clone()),
        })
        .await?;

    if response.status >= 400 {
        return Err(PublishError::http_status(
            response.status,
            &response.body_text(),
        ));
    }

    info!(object_id = %ticket.object_id, bytes = artifact.size(), "artifact uploaded");
    Ok(())
}
