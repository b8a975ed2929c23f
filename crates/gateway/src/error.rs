//! # Gateway エラー型
//!
//! リクエスト単位のエラー（`GatewayError`）と起動時の設定エラー（`ConfigError`）。
//! リクエスト単位のエラーはすべてハンドラ境界でJSONボディ付きのHTTPレスポンスに変換される。

use axum::http::StatusCode;
use axum::Json;
use upload_types::ErrorResponse;

/// 署名失敗時にクライアントへ返す固定メッセージ。
/// 詳細はログにのみ出力する。
pub const SIGNING_FAILURE_MESSAGE: &str = "Could not generate signed URLs";

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// name / email / files の欠落・不正、相対パスの不正
    #[error("{0}")]
    InvalidInput(String),
    /// 許可リストにない拡張子（サニタイズ後のファイル名を保持）
    #[error("File type not allowed: {0}")]
    UnsupportedFileType(String),
    /// 認証情報またはストレージ側での署名付きURL生成失敗
    #[error("署名付きURL生成に失敗: {0}")]
    Signing(String),
}

impl GatewayError {
    /// 入力不正の既定メッセージ。
    pub fn invalid_input() -> Self {
        GatewayError::InvalidInput("Invalid input".to_string())
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            GatewayError::InvalidInput(_) | GatewayError::UnsupportedFileType(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            GatewayError::Signing(detail) => {
                tracing::error!(error = %detail, "署名付きURLの生成に失敗しました");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    SIGNING_FAILURE_MESSAGE.to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// 起動時の設定エラー。発生した場合プロセスは起動しない。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("{0} must be set")]
    Missing(&'static str),
    /// 環境変数の値が不正
    #[error("{var} の値が不正です: {reason}")]
    Invalid { var: &'static str, reason: String },
    /// 署名用認証情報の取得に失敗
    #[error("署名用認証情報の取得に失敗: {0}")]
    Credentials(String),
    /// ストレージクライアントの初期化に失敗
    #[error("ストレージの初期化に失敗: {0}")]
    Storage(String),
}
