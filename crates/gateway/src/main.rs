//! # Signed Upload Gateway
//!
//! ブラウザからオブジェクトストレージへ直接アップロードさせるための
//! 署名付きURL発行Gateway。
//!
//! ## 役割
//! - アップロード者情報（名前・メール）とファイル名の検証
//! - アップロード者ごとの保存先パスの構築
//! - 保存先ごとのPUT専用・有効期限付き署名付きURLの発行
//!
//! ## API エンドポイント
//! - `GET /`: アップロード画面
//! - `POST /generate_signed_urls`: 署名付きURL発行
//! - `GET /healthz`: 死活監視

mod config;
mod credentials;
mod endpoints;
mod error;
mod storage;
mod validation;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{GatewayConfig, GatewayState, StorageSettings};
use crate::error::ConfigError;
use crate::storage::{GcsSigner, UploadSigner};

/// 設定されたバックエンドの署名器を構築する。
/// GCSの場合はここで署名用認証情報を一度だけ取得する。
async fn build_signer(storage: &StorageSettings) -> Result<Box<dyn UploadSigner>, ConfigError> {
    match storage {
        StorageSettings::Gcs(gcs) => {
            let http = reqwest::Client::new();
            let provider = credentials::build_provider(&gcs.credential_source, gcs, &http);
            tracing::info!(
                source = provider.name(),
                bucket = %gcs.bucket,
                "GCSの署名用認証情報を取得します"
            );

            let identity = provider
                .signing_identity()
                .await
                .map_err(|e| ConfigError::Credentials(e.to_string()))?;
            Ok(Box::new(GcsSigner::new(identity, gcs.bucket.clone())))
        }
        #[cfg(feature = "vendor-aws")]
        StorageSettings::S3(s3) => {
            tracing::info!(endpoint = %s3.endpoint, bucket = %s3.bucket, "S3互換ストレージを使用");
            Ok(Box::new(storage::S3Signer::from_settings(s3)?))
        }
        #[cfg(not(feature = "vendor-aws"))]
        StorageSettings::S3(_) => Err(ConfigError::Invalid {
            var: "STORAGE_BACKEND",
            reason: "s3を使うには vendor-aws フィーチャーが必要です".to_string(),
        }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env は任意
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;
    let signer = build_signer(&config.storage).await?;

    let state = Arc::new(GatewayState {
        signer,
        upload_prefix: config.upload_prefix.clone(),
        presign_expiry_secs: config.presign_expiry_secs,
        relative_path_policy: config.relative_path_policy,
    });

    let app = endpoints::router(state, config.max_request_body_bytes);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        upload_prefix = %config.upload_prefix,
        presign_expiry_secs = config.presign_expiry_secs,
        relative_path_policy = ?config.relative_path_policy,
        "Gatewayを {} で起動します",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
