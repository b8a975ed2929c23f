//! # フォールバックチェーン

use super::{CredentialError, CredentialProvider, SigningIdentity};

/// 登録順にプロバイダを試し、最初に成功したものを使う。
pub struct ChainProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainProvider {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for ChainProvider {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            match provider.signing_identity().await {
                Ok(identity) => {
                    tracing::info!(source = provider.name(), "署名用認証情報を取得しました");
                    return Ok(identity);
                }
                Err(e) => {
                    tracing::warn!(source = provider.name(), error = %e, "次の認証情報ソースを試します");
                    failures.push(format!("{}: {e}", provider.name()));
                }
            }
        }

        Err(CredentialError::Exhausted(failures.join("; ")))
    }
}
