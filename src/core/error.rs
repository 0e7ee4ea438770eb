//! Error handling for closed-test publishing
//!
//! Every failure of a publishing run is expressed as a [`PublishError`].
//! All variants are fatal to the run; the only soft failure (an invite code
//! requested without a test group) is reported as a warning instead.

use thiserror::Error;

/// Maximum number of characters of a raw response body kept for diagnostics
pub const MAX_DIAGNOSTIC_BODY: usize = 512;

/// Main error type for publishing operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Configuration errors
    #[error("設定エラー: {0}")]
    Config(String),

    // Credential errors (never reach the network)
    #[error("認証情報が不正です: {message}")]
    Credential { message: String },

    // Authentication errors
    #[error("認証に失敗しました: {message}")]
    Authentication { message: String },

    // Transport errors
    #[error("ネットワークエラーが発生しました: {message}")]
    Network { message: String },

    #[error("HTTP {status} エラー: {body}")]
    HttpStatus { status: u16, body: String },

    // Decode errors
    #[error("レスポンスの解析に失敗しました: {message} (body: {body})")]
    Decode { message: String, body: String },

    // Vendor-reported business failures
    #[error("APIがエラーを返しました (ret.code={code}): {message}")]
    RetCode { code: i64, message: String },

    #[error("APIがエラーを返しました (rtnCode={code})")]
    RtnCode { code: i64 },

    // Compile poll
    #[error(
        "パッケージ {package_id} のコンパイルがタイムアウトしました ({attempts}回確認, {elapsed_secs}秒経過)"
    )]
    CompileTimeout {
        package_id: String,
        attempts: u32,
        elapsed_secs: u64,
    },

    // Filesystem errors
    #[error("ファイル {path} を読み込めません: {message}")]
    Io { path: String, message: String },
}

impl PublishError {
    /// Build a decode error, truncating the raw body for diagnostics
    pub fn decode(message: impl Into<String>, body: &str) -> Self {
        Self::Decode {
            message: message.into(),
            body: truncate_body(body),
        }
    }

    /// Build an HTTP status error, truncating the raw body for diagnostics
    pub fn http_status(status: u16, body: &str) -> Self {
        Self::HttpStatus {
            status,
            body: truncate_body(body),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: error.to_string(),
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Credential { .. } => "CREDENTIAL_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::HttpStatus { .. } => "HTTP_STATUS_ERROR",
            Self::Decode { .. } => "DECODE_ERROR",
            Self::RetCode { .. } => "API_RET_CODE",
            Self::RtnCode { .. } => "API_RTN_CODE",
            Self::CompileTimeout { .. } => "COMPILE_TIMEOUT",
            Self::Io { .. } => "IO_ERROR",
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::Config(_) => vec![
                "設定ファイル (.closed-test-publisher.yaml) を確認してください",
                "CTP_* 環境変数が正しく設定されているか確認してください",
            ],
            Self::Credential { .. } => vec![
                "サービスアカウントのJSONファイルを確認してください",
                "key_id, private_key, sub_account, token_uri が含まれているか確認してください",
            ],
            Self::Authentication { .. } => vec![
                "クライアントIDとシークレットを確認してください",
                "APIクライアントの権限を確認してください",
            ],
            Self::Network { .. } => vec![
                "インターネット接続を確認してください",
                "APIのベースURLを確認してください",
            ],
            Self::HttpStatus { status, .. } if *status == 401 || *status == 403 => vec![
                "認証情報の有効期限と権限を確認してください",
            ],
            Self::HttpStatus { .. } => vec![
                "レスポンス本文を確認してください",
                "しばらく待ってから再実行してください",
            ],
            Self::Decode { .. } => vec!["APIのベースURLが正しいか確認してください"],
            Self::RetCode { .. } | Self::RtnCode { .. } => vec![
                "ベンダーのエラーコード一覧を確認してください",
                "アプリIDとテスト設定を確認してください",
            ],
            Self::CompileTimeout { .. } => vec![
                "コンソールでパッケージのコンパイル状態を確認してください",
                "作成済みのテストバージョンが残っている可能性があります",
            ],
            Self::Io { .. } => vec!["ファイルパスとアクセス権限を確認してください"],
        }
    }
}

/// Truncate a raw body to [`MAX_DIAGNOSTIC_BODY`] characters
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_DIAGNOSTIC_BODY {
        return body.to_string();
    }
    let truncated: String = body.chars().take(MAX_DIAGNOSTIC_BODY).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ret_code_error_display() {
        let error = PublishError::RetCode {
            code: 7,
            message: "bad".to_string(),
        };

        assert_eq!(error.code(), "API_RET_CODE");
        let display = error.to_string();
        assert!(display.contains("ret.code=7"));
        assert!(display.contains("bad"));
    }

    #[test]
    fn test_rtn_code_error_has_no_message() {
        let error = PublishError::RtnCode { code: 3 };

        assert_eq!(error.code(), "API_RTN_CODE");
        assert_eq!(error.to_string(), "APIがエラーを返しました (rtnCode=3)");
    }

    #[test]
    fn test_http_status_truncates_body() {
        let body = "x".repeat(2000);
        let error = PublishError::http_status(500, &body);

        match error {
            PublishError::HttpStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_DIAGNOSTIC_BODY + 3);
                assert!(body.ends_with("..."));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "あ".repeat(600);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), MAX_DIAGNOSTIC_BODY + 3);
    }

    #[test]
    fn test_short_body_is_kept() {
        assert_eq!(truncate_body("not json"), "not json");
    }

    #[test]
    fn test_unauthorized_suggests_credentials() {
        let error = PublishError::http_status(401, "");
        let actions = error.suggested_actions();
        assert!(actions.iter().any(|a| a.contains("認証情報")));
    }

    #[test]
    fn test_compile_timeout_display() {
        let error = PublishError::CompileTimeout {
            package_id: "P1".to_string(),
            attempts: 30,
            elapsed_secs: 300,
        };

        assert_eq!(error.code(), "COMPILE_TIMEOUT");
        assert!(error.to_string().contains("P1"));
        assert!(error.to_string().contains("30回"));
    }

    #[test]
    fn test_every_error_has_suggestions() {
        let errors = vec![
            PublishError::Config("missing appId".to_string()),
            PublishError::Credential {
                message: "key_id".to_string(),
            },
            PublishError::Authentication {
                message: "no token".to_string(),
            },
            PublishError::Network {
                message: "refused".to_string(),
            },
            PublishError::decode("not json", "<html>"),
            PublishError::Io {
                path: "app.hap".to_string(),
                message: "not found".to_string(),
            },
        ];

        for error in errors {
            assert!(!error.suggested_actions().is_empty(), "{}", error.code());
        }
    }
}
