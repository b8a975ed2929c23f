//! # 署名付きアップロードURL発行
//!
//! Gateway運用者が選択可能なオブジェクトストレージの抽象インターフェース。
//! Google Cloud Storage実装は `gcs`、S3互換ストレージ実装は `s3` サブモジュールを参照。

pub mod gcs;
#[cfg(feature = "vendor-aws")]
pub mod s3;

pub use gcs::GcsSigner;
#[cfg(feature = "vendor-aws")]
pub use s3::S3Signer;

use crate::error::GatewayError;

/// アップロード時にクライアントが送るべきContent-Type。
/// 署名にこの値を含めるため、異なるContent-TypeでのPUTはストレージ側で拒否される。
pub const UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// 署名付きアップロードURLを発行するストレージの抽象インターフェース。
///
/// 実装はプロセス起動時に一度だけ構築され、全リクエストで共有される。
#[async_trait::async_trait]
pub trait UploadSigner: Send + Sync {
    /// `object_name` へのPUTのみを許可する署名付きURLを生成する。
    ///
    /// 有効期限は発行時刻から `expiry_secs` 秒。
    async fn sign_upload_url(
        &self,
        object_name: &str,
        expiry_secs: u32,
    ) -> Result<String, GatewayError>;
}
