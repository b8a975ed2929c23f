//! # Google Cloud Storage実装
//!
//! V4署名付きURL（PUT専用、Content-Type固定）を発行する。

use std::time::Duration;

use google_cloud_storage::client::Client;
use google_cloud_storage::sign::{SignedURLMethod, SignedURLOptions};

use super::{UploadSigner, UPLOAD_CONTENT_TYPE};
use crate::credentials::{SignMode, SigningIdentity};
use crate::error::GatewayError;

/// GCSバケットに対する署名付きURL発行。
pub struct GcsSigner {
    client: Client,
    bucket: String,
    google_access_id: Option<String>,
    sign_mode: SignMode,
}

impl GcsSigner {
    /// 起動時に取得したプリンシパルからバケットハンドルを構築する。
    pub fn new(identity: SigningIdentity, bucket: impl Into<String>) -> Self {
        Self {
            client: Client::new(identity.config),
            bucket: bucket.into(),
            google_access_id: identity.google_access_id,
            sign_mode: identity.sign_mode,
        }
    }
}

#[async_trait::async_trait]
impl UploadSigner for GcsSigner {
    async fn sign_upload_url(
        &self,
        object_name: &str,
        expiry_secs: u32,
    ) -> Result<String, GatewayError> {
        let options = SignedURLOptions {
            method: SignedURLMethod::PUT,
            expires: Duration::from_secs(u64::from(expiry_secs)),
            content_type: Some(UPLOAD_CONTENT_TYPE.to_string()),
            ..Default::default()
        };

        self.client
            .signed_url(
                &self.bucket,
                object_name,
                self.google_access_id.clone(),
                self.sign_mode.to_sign_by(),
                options,
            )
            .await
            .map_err(|e| {
                GatewayError::Signing(format!(
                    "gs://{}/{} の署名付きURL生成失敗: {e}",
                    self.bucket, object_name
                ))
            })
    }
}
