//! # S3互換ストレージ実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIで署名付きPUT URLを発行する。
//! 主にローカル開発（MinIO）用。

use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;

use super::{UploadSigner, UPLOAD_CONTENT_TYPE};
use crate::config::S3Settings;
use crate::error::{ConfigError, GatewayError};

/// S3互換ストレージによる署名付きURL発行。
pub struct S3Signer {
    /// 署名に使うバケット。
    /// `public_endpoint` が設定されている場合はそちらのホスト名で構築される
    /// （Docker内部ホスト名と外部ホスト名が異なる場合）。
    bucket: s3::Bucket,
}

impl S3Signer {
    pub fn new(bucket: s3::Bucket) -> Self {
        Self { bucket }
    }

    /// S3互換バケットを初期化する。
    fn init_bucket(
        endpoint: &str,
        region: Option<&str>,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> Result<s3::Bucket, ConfigError> {
        // AWS S3エンドポイント（s3.REGION.amazonaws.com）からリージョンを自動検出。
        // 非AWSエンドポイントではus-east-1をフォールバックとして使用。
        let detected_region = region.map(str::to_string).unwrap_or_else(|| {
            endpoint
                .find("s3.")
                .and_then(|start| {
                    let rest = &endpoint[start + 3..];
                    rest.find(".amazonaws.com").map(|end| rest[..end].to_string())
                })
                .unwrap_or_else(|| "us-east-1".to_string())
        });
        let region = s3::Region::Custom {
            region: detected_region,
            endpoint: endpoint.to_string(),
        };

        let credentials =
            s3::creds::Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| ConfigError::Storage(format!("S3認証情報の構築に失敗: {e}")))?;

        let bucket = s3::Bucket::new(bucket_name, region, credentials)
            .map_err(|e| ConfigError::Storage(format!("S3バケットの構築に失敗: {e}")))?
            .with_path_style();

        Ok(*bucket)
    }

    /// 設定から構築する。
    pub fn from_settings(settings: &S3Settings) -> Result<Self, ConfigError> {
        let endpoint = match &settings.public_endpoint {
            Some(public_ep) => {
                tracing::info!(
                    s3_public_endpoint = %public_ep,
                    "クライアント向けS3エンドポイントを設定"
                );
                public_ep.as_str()
            }
            None => settings.endpoint.as_str(),
        };

        let bucket = Self::init_bucket(
            endpoint,
            settings.region.as_deref(),
            &settings.access_key,
            &settings.secret_key,
            &settings.bucket,
        )?;

        Ok(Self::new(bucket))
    }
}

#[async_trait::async_trait]
impl UploadSigner for S3Signer {
    async fn sign_upload_url(
        &self,
        object_name: &str,
        expiry_secs: u32,
    ) -> Result<String, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(UPLOAD_CONTENT_TYPE));

        self.bucket
            .presign_put(object_name, expiry_secs, Some(headers), None)
            .await
            .map_err(|e| GatewayError::Signing(format!("S3署名付きアップロードURL生成失敗: {e}")))
    }
}
