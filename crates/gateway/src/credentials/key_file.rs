//! # サービスアカウント鍵ファイル

use google_cloud_storage::client::google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::ClientConfig;

use super::{CredentialError, CredentialProvider, SignMode, SigningIdentity};

/// JSON鍵ファイルの秘密鍵でローカル署名するプロバイダ。
pub struct KeyFileProvider {
    path: String,
}

impl KeyFileProvider {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for KeyFileProvider {
    fn name(&self) -> &'static str {
        "key-file"
    }

    async fn signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
        let credentials = CredentialsFile::new_from_file(self.path.clone())
            .await
            .map_err(|e| CredentialError::Auth(format!("{}: {e}", self.path)))?;
        tracing::info!(path = %self.path, "サービスアカウント鍵ファイルを読み込みました");
        identity_from_credentials(credentials).await
    }
}

/// パース済みの鍵からプリンシパルを構築する。
/// 鍵に秘密鍵が含まれていればそれでローカル署名する。
pub(super) async fn identity_from_credentials(
    credentials: CredentialsFile,
) -> Result<SigningIdentity, CredentialError> {
    let google_access_id = credentials.client_email.clone();
    let sign_mode = match &credentials.private_key {
        Some(pem) => SignMode::PrivateKey(pem.clone().into_bytes()),
        None => SignMode::ClientDefault,
    };

    let config = ClientConfig::default()
        .with_credentials(credentials)
        .await
        .map_err(|e| CredentialError::Auth(e.to_string()))?;

    Ok(SigningIdentity {
        config,
        google_access_id,
        sign_mode,
    })
}
