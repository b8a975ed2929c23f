//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 必須値の欠落や不正値は起動時エラーとし、リクエスト処理中には発生させない。

use std::fmt::Display;
use std::str::FromStr;

use crate::credentials::metadata::DEFAULT_METADATA_HOST;
use crate::credentials::secret_manager::DEFAULT_SECRET_MANAGER_ENDPOINT;
use crate::credentials::CredentialSource;
use crate::error::ConfigError;
use crate::storage::UploadSigner;
use crate::validation::RelativePathPolicy;

/// 保存先の固定プレフィックス（既定値）。
pub const DEFAULT_UPLOAD_PREFIX: &str = "public_data_upload";
/// 署名付きURLの有効期限（既定値、秒）。
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u32 = 3600;
/// V4署名付きURLの有効期限の上限（7日）。
pub const MAX_PRESIGN_EXPIRY_SECS: u32 = 7 * 24 * 60 * 60;
/// JSONリクエストボディの上限（既定値、バイト）。
pub const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
/// 待ち受けポート（既定値）。
pub const DEFAULT_PORT: u16 = 8080;
/// `chain` 選択時に `GCS_CREDENTIAL_CHAIN` が未設定の場合の試行順。
pub const DEFAULT_CREDENTIAL_CHAIN: &str = "secret-manager,metadata";

/// Secret Manager上の鍵の所在。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretSettings {
    pub project: String,
    pub name: String,
    pub version: String,
}

/// Google Cloud Storageの設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsSettings {
    pub bucket: String,
    pub credential_source: CredentialSource,
    pub key_file: Option<String>,
    pub secret: Option<SecretSettings>,
    /// メタデータサーバーのホスト（`GCE_METADATA_HOST`）
    pub metadata_host: String,
    pub secret_manager_endpoint: String,
}

/// S3互換ストレージの設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint: String,
    /// クライアント向けエンドポイント（Docker内部ホスト名と異なる場合）
    pub public_endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

/// 使用するストレージバックエンド。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSettings {
    Gcs(GcsSettings),
    S3(S3Settings),
}

/// 起動時に確定するGateway設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub storage: StorageSettings,
    pub upload_prefix: String,
    pub presign_expiry_secs: u32,
    pub relative_path_policy: RelativePathPolicy,
    pub max_request_body_bytes: usize,
    pub port: u16,
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から構築する。空文字列は未設定とみなす。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = get("STORAGE_BACKEND").unwrap_or_else(|| "gcs".to_string());
        let storage = match backend.trim().to_ascii_lowercase().as_str() {
            "gcs" => StorageSettings::Gcs(gcs_settings(&get)?),
            "s3" => StorageSettings::S3(s3_settings(&get)?),
            other => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    reason: format!("不明なバックエンド: {other}（gcs / s3）"),
                })
            }
        };

        let presign_expiry_secs =
            parse_or(&get, "SIGNED_URL_EXPIRY_SECS", DEFAULT_PRESIGN_EXPIRY_SECS)?;
        if presign_expiry_secs == 0 || presign_expiry_secs > MAX_PRESIGN_EXPIRY_SECS {
            return Err(ConfigError::Invalid {
                var: "SIGNED_URL_EXPIRY_SECS",
                reason: format!("1〜{MAX_PRESIGN_EXPIRY_SECS} の範囲で指定してください"),
            });
        }

        let upload_prefix = get("UPLOAD_PREFIX")
            .map(|p| p.trim().trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_UPLOAD_PREFIX.to_string());

        Ok(Self {
            storage,
            upload_prefix,
            presign_expiry_secs,
            relative_path_policy: parse_or(
                &get,
                "RELATIVE_PATH_POLICY",
                RelativePathPolicy::default(),
            )?,
            max_request_body_bytes: parse_or(
                &get,
                "MAX_REQUEST_BODY_BYTES",
                DEFAULT_MAX_REQUEST_BODY_BYTES,
            )?,
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
        })
    }
}

fn parse_or<T, F>(get: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn gcs_settings<F>(get: &F) -> Result<GcsSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let bucket = get("GCS_BUCKET_NAME").ok_or(ConfigError::Missing("GCS_BUCKET_NAME"))?;

    let credential_source = match parse_or(
        get,
        "GCS_CREDENTIAL_SOURCE",
        CredentialSource::Default,
    )? {
        CredentialSource::Chain(_) => {
            let chain = get("GCS_CREDENTIAL_CHAIN")
                .unwrap_or_else(|| DEFAULT_CREDENTIAL_CHAIN.to_string());
            CredentialSource::Chain(CredentialSource::parse_chain(&chain).map_err(|reason| {
                ConfigError::Invalid {
                    var: "GCS_CREDENTIAL_CHAIN",
                    reason,
                }
            })?)
        }
        source => source,
    };

    let key_file = get("GCS_KEY_FILE").or_else(|| get("GOOGLE_APPLICATION_CREDENTIALS"));
    if uses_source(&credential_source, &CredentialSource::KeyFile) && key_file.is_none() {
        return Err(ConfigError::Missing("GCS_KEY_FILE"));
    }

    let secret = if uses_source(&credential_source, &CredentialSource::SecretManager) {
        Some(SecretSettings {
            project: get("GCS_SECRET_PROJECT")
                .or_else(|| get("GOOGLE_CLOUD_PROJECT"))
                .ok_or(ConfigError::Missing("GCS_SECRET_PROJECT"))?,
            name: get("GCS_SECRET_NAME").ok_or(ConfigError::Missing("GCS_SECRET_NAME"))?,
            version: get("GCS_SECRET_VERSION").unwrap_or_else(|| "latest".to_string()),
        })
    } else {
        None
    };

    Ok(GcsSettings {
        bucket,
        credential_source,
        key_file,
        secret,
        metadata_host: get("GCE_METADATA_HOST")
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
        secret_manager_endpoint: get("SECRET_MANAGER_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_SECRET_MANAGER_ENDPOINT.to_string()),
    })
}

/// 選択された取得元（チェーンの場合はその要素）に `target` が含まれるか。
fn uses_source(source: &CredentialSource, target: &CredentialSource) -> bool {
    match source {
        CredentialSource::Chain(sources) => sources.iter().any(|s| uses_source(s, target)),
        source => source == target,
    }
}

fn s3_settings<F>(get: &F) -> Result<S3Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(S3Settings {
        endpoint: get("S3_ENDPOINT").unwrap_or_else(|| "http://localhost:9000".to_string()),
        public_endpoint: get("S3_PUBLIC_ENDPOINT"),
        region: get("S3_REGION"),
        access_key: get("S3_ACCESS_KEY").unwrap_or_else(|| "minioadmin".to_string()),
        secret_key: get("S3_SECRET_KEY").unwrap_or_else(|| "minioadmin".to_string()),
        bucket: get("S3_BUCKET").ok_or(ConfigError::Missing("S3_BUCKET"))?,
    })
}

/// Gatewayの共有状態。
///
/// 起動時に一度だけ構築され、`Arc` で全リクエストに共有される。実行中に変更しない。
pub struct GatewayState {
    /// 署名付きURL発行（GCS / S3互換、トレイトで抽象化）
    pub signer: Box<dyn UploadSigner>,
    /// 保存先の固定プレフィックス（末尾の `/` なし）
    pub upload_prefix: String,
    /// 署名付きURLの有効期限（秒）
    pub presign_expiry_secs: u32,
    /// 相対パスの扱い
    pub relative_path_policy: RelativePathPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| map.get(key).cloned())
    }

    /// バケット名だけで既定値の設定が得られる
    #[test]
    fn test_defaults() {
        let config = load(&[("GCS_BUCKET_NAME", "uploads")]).unwrap();

        let StorageSettings::Gcs(gcs) = &config.storage else {
            panic!("既定バックエンドがGCSではない");
        };
        assert_eq!(gcs.bucket, "uploads");
        assert_eq!(gcs.credential_source, CredentialSource::Default);
        assert_eq!(gcs.metadata_host, DEFAULT_METADATA_HOST);
        assert_eq!(config.upload_prefix, "public_data_upload");
        assert_eq!(config.presign_expiry_secs, 3600);
        assert_eq!(config.relative_path_policy, RelativePathPolicy::RejectTraversal);
        assert_eq!(config.max_request_body_bytes, 1024 * 1024);
        assert_eq!(config.port, 8080);
    }

    /// バケット名の欠落は起動時エラー
    #[test]
    fn test_missing_bucket() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::Missing("GCS_BUCKET_NAME"))
        ));
        assert!(matches!(
            load(&[("GCS_BUCKET_NAME", "  ")]),
            Err(ConfigError::Missing("GCS_BUCKET_NAME"))
        ));
        assert!(matches!(
            load(&[("STORAGE_BACKEND", "s3")]),
            Err(ConfigError::Missing("S3_BUCKET"))
        ));
    }

    #[test]
    fn test_invalid_values() {
        for (var, value) in [
            ("SIGNED_URL_EXPIRY_SECS", "soon"),
            ("SIGNED_URL_EXPIRY_SECS", "0"),
            ("SIGNED_URL_EXPIRY_SECS", "604801"),
            ("RELATIVE_PATH_POLICY", "lenient"),
            ("GCS_CREDENTIAL_SOURCE", "gcloud"),
            ("STORAGE_BACKEND", "azure"),
            ("PORT", "http"),
        ] {
            let result = load(&[("GCS_BUCKET_NAME", "uploads"), (var, value)]);
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "{var}={value} が受理された"
            );
        }
    }

    /// 鍵ファイルはGOOGLE_APPLICATION_CREDENTIALSにフォールバックする
    #[test]
    fn test_key_file_source() {
        assert!(matches!(
            load(&[
                ("GCS_BUCKET_NAME", "uploads"),
                ("GCS_CREDENTIAL_SOURCE", "key-file"),
            ]),
            Err(ConfigError::Missing("GCS_KEY_FILE"))
        ));

        let config = load(&[
            ("GCS_BUCKET_NAME", "uploads"),
            ("GCS_CREDENTIAL_SOURCE", "key-file"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/secrets/sa.json"),
        ])
        .unwrap();
        let StorageSettings::Gcs(gcs) = config.storage else {
            panic!("GCSではない");
        };
        assert_eq!(gcs.key_file.as_deref(), Some("/secrets/sa.json"));
    }

    /// チェーン既定値はsecret-manager→metadataで、Secret Manager設定が必須になる
    #[test]
    fn test_chain_source() {
        assert!(matches!(
            load(&[
                ("GCS_BUCKET_NAME", "uploads"),
                ("GCS_CREDENTIAL_SOURCE", "chain"),
                ("GOOGLE_CLOUD_PROJECT", "proj"),
            ]),
            Err(ConfigError::Missing("GCS_SECRET_NAME"))
        ));

        let config = load(&[
            ("GCS_BUCKET_NAME", "uploads"),
            ("GCS_CREDENTIAL_SOURCE", "chain"),
            ("GOOGLE_CLOUD_PROJECT", "proj"),
            ("GCS_SECRET_NAME", "signer-key"),
        ])
        .unwrap();
        let StorageSettings::Gcs(gcs) = config.storage else {
            panic!("GCSではない");
        };
        assert_eq!(
            gcs.credential_source,
            CredentialSource::Chain(vec![
                CredentialSource::SecretManager,
                CredentialSource::Metadata,
            ])
        );
        assert_eq!(
            gcs.secret,
            Some(SecretSettings {
                project: "proj".to_string(),
                name: "signer-key".to_string(),
                version: "latest".to_string(),
            })
        );
    }

    #[test]
    fn test_s3_settings() {
        let config = load(&[
            ("STORAGE_BACKEND", "S3"),
            ("S3_BUCKET", "title-uploads"),
            ("S3_PUBLIC_ENDPOINT", "http://localhost:19000"),
            ("UPLOAD_PREFIX", "/incoming/"),
        ])
        .unwrap();
        let StorageSettings::S3(s3) = &config.storage else {
            panic!("S3ではない");
        };
        assert_eq!(s3.endpoint, "http://localhost:9000");
        assert_eq!(s3.public_endpoint.as_deref(), Some("http://localhost:19000"));
        assert_eq!(s3.access_key, "minioadmin");
        assert_eq!(config.upload_prefix, "incoming");
    }
}
