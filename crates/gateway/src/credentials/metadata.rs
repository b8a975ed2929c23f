//! # メタデータサーバー
//!
//! Compute Engine / Cloud Run のインスタンスメタデータからサービスアカウント情報を取得する。

use google_cloud_storage::client::ClientConfig;
use serde::Deserialize;

use super::{CredentialError, CredentialProvider, SignMode, SigningIdentity};

/// メタデータサーバーの既定ホスト。
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// トークンエンドポイントのレスポンス。
#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// メタデータサーバーへの最小限のクライアント。
#[derive(Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    /// `host` は `metadata.google.internal` や `127.0.0.1:8081` の形式。
    pub fn new(http: reqwest::Client, host: &str) -> Self {
        Self {
            http,
            base_url: format!("http://{}", host.trim_end_matches('/')),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, CredentialError> {
        let url = format!("{}/computeMetadata/v1/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| CredentialError::Metadata(format!("HTTP送信失敗: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Metadata(format!(
                "{path} がエラーを返しました: HTTP {status}"
            )));
        }
        Ok(response)
    }

    /// インスタンスに割り当てられた既定サービスアカウントのメールアドレス。
    pub async fn service_account_email(&self) -> Result<String, CredentialError> {
        let body = self
            .get("instance/service-accounts/default/email")
            .await?
            .text()
            .await
            .map_err(|e| CredentialError::Metadata(format!("レスポンス読み取り失敗: {e}")))?;
        let email = body.trim();
        if email.is_empty() {
            return Err(CredentialError::Metadata(
                "サービスアカウントのメールアドレスが空です".to_string(),
            ));
        }
        Ok(email.to_string())
    }

    /// 既定サービスアカウントのOAuth2アクセストークン。
    pub async fn access_token(&self) -> Result<String, CredentialError> {
        let token: AccessTokenResponse = self
            .get("instance/service-accounts/default/token")
            .await?
            .json()
            .await
            .map_err(|e| CredentialError::Metadata(format!("トークンのパースに失敗: {e}")))?;
        Ok(token.access_token)
    }
}

/// インスタンスIDで署名するプロバイダ。
///
/// 秘密鍵を持たないため、署名はIAM Credentials APIのsignBlobで行う。
/// サービスアカウントには `iam.serviceAccounts.signBlob` 権限が必要。
pub struct MetadataProvider {
    client: MetadataClient,
}

impl MetadataProvider {
    pub fn new(client: MetadataClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for MetadataProvider {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
        let email = self.client.service_account_email().await?;
        tracing::info!(service_account = %email, "メタデータサーバーのサービスアカウントを使用");

        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| CredentialError::Auth(e.to_string()))?;

        Ok(SigningIdentity {
            config,
            google_access_id: Some(email),
            sign_mode: SignMode::SignBytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode, Uri};

    /// テスト用モックメタデータサーバーを起動する。
    /// `Metadata-Flavor: Google` ヘッダーがないリクエストは403で拒否する。
    async fn start_mock_metadata(email: &'static str, token: &'static str) -> u16 {
        let app = axum::Router::new().fallback(move |uri: Uri, headers: HeaderMap| async move {
            if headers.get("metadata-flavor").and_then(|v| v.to_str().ok()) != Some("Google") {
                return (StatusCode::FORBIDDEN, String::new());
            }
            match uri.path() {
                "/computeMetadata/v1/instance/service-accounts/default/email" => {
                    (StatusCode::OK, format!("{email}\n"))
                }
                "/computeMetadata/v1/instance/service-accounts/default/token" => (
                    StatusCode::OK,
                    serde_json::json!({
                        "access_token": token,
                        "expires_in": 3599,
                        "token_type": "Bearer"
                    })
                    .to_string(),
                ),
                _ => (StatusCode::NOT_FOUND, String::new()),
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

    /// メールアドレスの末尾改行が除去されることを確認
    #[tokio::test]
    async fn test_service_account_email() {
        let port = start_mock_metadata("uploader@proj.iam.gserviceaccount.com", "t").await;
        let client = MetadataClient::new(reqwest::Client::new(), &format!("127.0.0.1:{port}"));

        let email = client.service_account_email().await.unwrap();
        assert_eq!(email, "uploader@proj.iam.gserviceaccount.com");
    }

    #[tokio::test]
    async fn test_access_token() {
        let port = start_mock_metadata("sa@proj.iam.gserviceaccount.com", "ya29.test").await;
        let client = MetadataClient::new(reqwest::Client::new(), &format!("127.0.0.1:{port}"));

        assert_eq!(client.access_token().await.unwrap(), "ya29.test");
    }

    /// メタデータサーバーに到達できない場合はエラーになる
    #[tokio::test]
    async fn test_unreachable_metadata_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = MetadataClient::new(reqwest::Client::new(), &format!("127.0.0.1:{port}"));
        assert!(matches!(
            client.service_account_email().await,
            Err(CredentialError::Metadata(_))
        ));
    }
}
