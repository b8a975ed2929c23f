//! # Secret Manager
//!
//! Secret Managerに保管されたサービスアカウントJSON鍵を取得し、署名に使う。
//! Secret Managerへのアクセストークンはメタデータサーバーから取得する。

use base64::Engine;
use google_cloud_storage::client::google_cloud_auth::credentials::CredentialsFile;
use serde::Deserialize;

use super::key_file::identity_from_credentials;
use super::{CredentialError, CredentialProvider, MetadataClient, SigningIdentity};
use crate::config::SecretSettings;

/// Secret Manager APIの既定エンドポイント。
pub const DEFAULT_SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com";

/// `versions/*:access` のレスポンス。
#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    /// Base64エンコードされたシークレット本体
    data: String,
}

/// Secret Manager上の鍵で署名するプロバイダ。
pub struct SecretManagerProvider {
    metadata: MetadataClient,
    http: reqwest::Client,
    endpoint: String,
    secret: SecretSettings,
}

impl SecretManagerProvider {
    pub fn new(
        metadata: MetadataClient,
        http: reqwest::Client,
        endpoint: &str,
        secret: SecretSettings,
    ) -> Self {
        Self {
            metadata,
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            secret,
        }
    }

    /// シークレットのバージョンにアクセスし、デコード済みの鍵JSONを返す。
    pub async fn fetch_key_json(&self) -> Result<String, CredentialError> {
        let token = self.metadata.access_token().await?;

        let url = format!(
            "{}/v1/projects/{}/secrets/{}/versions/{}:access",
            self.endpoint, self.secret.project, self.secret.name, self.secret.version
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CredentialError::SecretManager(format!("HTTP送信失敗: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::SecretManager(format!(
                "Secret Managerがエラーを返しました: HTTP {status} - {body}"
            )));
        }

        let access: AccessSecretVersionResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::SecretManager(format!("レスポンスのパースに失敗: {e}")))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(access.payload.data.trim())
            .map_err(|e| CredentialError::SecretManager(format!("Base64デコードに失敗: {e}")))?;

        String::from_utf8(bytes)
            .map_err(|e| CredentialError::SecretManager(format!("鍵がUTF-8ではありません: {e}")))
    }
}

#[async_trait::async_trait]
impl CredentialProvider for SecretManagerProvider {
    fn name(&self) -> &'static str {
        "secret-manager"
    }

    async fn signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
        let key_json = self.fetch_key_json().await?;
        tracing::info!(
            project = %self.secret.project,
            secret = %self.secret.name,
            version = %self.secret.version,
            "Secret Managerからサービスアカウント鍵を取得"
        );

        let credentials = CredentialsFile::new_from_str(&key_json)
            .await
            .map_err(|e| CredentialError::Auth(e.to_string()))?;
        identity_from_credentials(credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode, Uri};

    const KEY_JSON: &str = r#"{"type":"service_account","client_email":"sa@proj.iam.gserviceaccount.com"}"#;

    /// メタデータのトークンとSecret Managerのアクセスを1つで受けるモックサーバー
    async fn start_mock_google() -> u16 {
        let app = axum::Router::new().fallback(|uri: Uri, headers: HeaderMap| async move {
            match uri.path() {
                "/computeMetadata/v1/instance/service-accounts/default/token" => (
                    StatusCode::OK,
                    serde_json::json!({"access_token": "ya29.test", "expires_in": 3599})
                        .to_string(),
                ),
                "/v1/projects/proj/secrets/signer-key/versions/latest:access" => {
                    let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
                    if auth != Some("Bearer ya29.test") {
                        return (StatusCode::UNAUTHORIZED, String::new());
                    }
                    let data = base64::engine::general_purpose::STANDARD.encode(KEY_JSON);
                    (
                        StatusCode::OK,
                        serde_json::json!({
                            "name": "projects/proj/secrets/signer-key/versions/3",
                            "payload": {"data": data}
                        })
                        .to_string(),
                    )
                }
                _ => (StatusCode::NOT_FOUND, "secret not found".to_string()),
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        port
    }

    fn provider(port: u16, secret_name: &str) -> SecretManagerProvider {
        let http = reqwest::Client::new();
        SecretManagerProvider::new(
            MetadataClient::new(http.clone(), &format!("127.0.0.1:{port}")),
            http,
            &format!("http://127.0.0.1:{port}/"),
            SecretSettings {
                project: "proj".to_string(),
                name: secret_name.to_string(),
                version: "latest".to_string(),
            },
        )
    }

    /// ペイロードがBase64デコードされて鍵JSONとして返ることを確認
    #[tokio::test]
    async fn test_fetch_key_json() {
        let port = start_mock_google().await;
        let key = provider(port, "signer-key").fetch_key_json().await.unwrap();
        assert_eq!(key, KEY_JSON);
    }

    /// 存在しないシークレットはSecretManagerエラー
    #[tokio::test]
    async fn test_fetch_missing_secret() {
        let port = start_mock_google().await;
        let result = provider(port, "no-such-secret").fetch_key_json().await;
        match result {
            Err(CredentialError::SecretManager(msg)) => assert!(msg.contains("404"), "{msg}"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
