//! Test description ("what to test") lookup

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::error::PublishError;

/// Longest description taken from a WhatToTest file, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 50;

/// Path of the description file for `language` inside `dir`
pub fn description_path(dir: &Path, language: &str) -> PathBuf {
    dir.join(format!("WhatToTest.{}.txt", language))
}

/// Read `WhatToTest.<language>.txt`; a missing file yields an empty description
pub async fn read_description(dir: &Path, language: &str) -> Result<String, PublishError> {
    let path = description_path(dir, language);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => {
            let text = text.trim().to_string();
            info!(path = %path.display(), chars = text.chars().count(), "read test description");
            Ok(text)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "WhatToTest file not found");
            Ok(String::new())
        }
        Err(e) => Err(PublishError::io(&path, e)),
    }
}

/// Keep at most `max_chars` characters of `content`
pub fn truncate_description(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((end, _)) => content[..end].to_string(),
        None => content.to_string(),
    }
}

/// Description sent with the test version
///
/// A literal `test_desc` wins as given; otherwise the WhatToTest file is read
/// and cut to [`MAX_DESCRIPTION_CHARS`].
pub async fn resolve_description(
    test_desc: Option<&str>,
    dir: &Path,
    language: &str,
) -> Result<String, PublishError> {
    match test_desc {
        Some(desc) => Ok(desc.to_string()),
        None => Ok(truncate_description(
            &read_description(dir, language).await?,
            MAX_DESCRIPTION_CHARS,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_language_specific_file() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("WhatToTest.en-US.txt"), "\n  Check login\n")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("WhatToTest.ja-JP.txt"), "ログイン確認")
            .await
            .unwrap();

        assert_eq!(read_description(dir.path(), "en-US").await.unwrap(), "Check login");
        assert_eq!(read_description(dir.path(), "ja-JP").await.unwrap(), "ログイン確認");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_description(dir.path(), "en-US").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_unreadable_path_is_io_error() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir(dir.path().join("WhatToTest.en-US.txt"))
            .await
            .unwrap();

        assert!(matches!(
            read_description(dir.path(), "en-US").await,
            Err(PublishError::Io { .. })
        ));
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_description("short", 50), "short");
        assert_eq!(truncate_description(&"a".repeat(60), 50), "a".repeat(50));
        assert_eq!(truncate_description(&"確".repeat(51), 50).chars().count(), 50);
    }

    #[tokio::test]
    async fn test_file_description_is_cut_to_fifty_characters() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("WhatToTest.zh-Hans.txt"), "x".repeat(80))
            .await
            .unwrap();

        let desc = resolve_description(None, dir.path(), "zh-Hans").await.unwrap();
        assert_eq!(desc, "x".repeat(MAX_DESCRIPTION_CHARS));
    }

    #[tokio::test]
    async fn test_literal_description_wins_over_file() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("WhatToTest.zh-Hans.txt"), "from file")
            .await
            .unwrap();
        let literal = "y".repeat(70);

        let desc = resolve_description(Some(&literal), dir.path(), "zh-Hans")
            .await
            .unwrap();
        assert_eq!(desc, literal);
    }
}
