//! # Signed Upload Gateway 共有型定義
//!
//! `POST /generate_signed_urls` の入出力をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - すべてJSON。フィールド名はブラウザ側JavaScriptに合わせてcamelCase。
//! - 欠落フィールドは空値としてデシリアライズし、検証はGateway側で行う。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /generate_signed_urls
// ---------------------------------------------------------------------------

/// クライアント側で選択された1ファイルの記述子。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileDescriptor {
    /// クライアントが申告したファイル名
    pub name: String,
    /// クライアントが申告した相対パス（サブディレクトリを含み得る）
    pub relative_path: String,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
        }
    }
}

/// /generate_signed_urls リクエスト。
///
/// `name` / `email` はアップロード者の自己申告値で、認証には使わない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadRequest {
    /// アップロード者名（保存先ディレクトリ名になる）
    pub name: Option<String>,
    /// アップロード者のメールアドレス
    pub email: Option<String>,
    /// アップロード対象ファイル（順序は処理順）
    pub files: Vec<FileDescriptor>,
}

/// /generate_signed_urls 成功レスポンス。
///
/// キーは各ファイルの `relativePath`。同じ相対パスが複数ある場合は後勝ち。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlsResponse {
    /// relativePath → 署名付きPUT URL
    pub signed_urls: BTreeMap<String, String>,
}

/// エラーレスポンス（400 / 500共通）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 利用者向けエラーメッセージ
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ブラウザが送るcamelCaseのJSONをそのまま受け取れることを確認
    #[test]
    fn test_upload_request_from_browser_json() {
        let body = serde_json::json!({
            "name": "Acme Co",
            "email": "ops@acme.example",
            "files": [
                {"name": "q1.csv", "relativePath": "reports/q1.csv"},
                {"name": "logo.png", "relativePath": "logo.png"}
            ]
        });

        let req: UploadRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.name.as_deref(), Some("Acme Co"));
        assert_eq!(req.files.len(), 2);
        assert_eq!(req.files[0], FileDescriptor::new("q1.csv", "reports/q1.csv"));
    }

    /// 欠落フィールドはパースエラーではなく空値になる
    #[test]
    fn test_upload_request_missing_fields() {
        let req: UploadRequest = serde_json::from_str(r#"{"files": [{"name": "a.pdf"}]}"#).unwrap();
        assert!(req.name.is_none());
        assert!(req.email.is_none());
        assert_eq!(req.files[0].relative_path, "");
    }

    /// レスポンスのキー名が `signedUrls` になることを確認
    #[test]
    fn test_signed_urls_response_shape() {
        let mut signed_urls = BTreeMap::new();
        signed_urls.insert("a.pdf".to_string(), "https://example.com/a".to_string());
        let value = serde_json::to_value(SignedUrlsResponse { signed_urls }).unwrap();
        assert_eq!(value["signedUrls"]["a.pdf"], "https://example.com/a");
    }
}
