//! # 署名用認証情報
//!
//! Google Cloud Storageの署名付きURLを発行できるプリンシパルの取得を抽象化する。
//!
//! ## プロバイダ実装
//! - `AmbientDefaultProvider`: Application Default Credentials
//! - `KeyFileProvider`: サービスアカウントJSON鍵ファイル
//! - `MetadataProvider`: Compute Engine / Cloud Run のインスタンスID（IAM signBlobで署名）
//! - `SecretManagerProvider`: Secret Managerに保管されたサービスアカウント鍵
//! - `ChainProvider`: 上記を順に試すフォールバックチェーン
//!
//! どのプロバイダを使うかは起動時に設定で一つだけ選ぶ。

pub mod chain;
pub mod key_file;
pub mod metadata;
pub mod secret_manager;

pub use chain::ChainProvider;
pub use key_file::KeyFileProvider;
pub use metadata::{MetadataClient, MetadataProvider};
pub use secret_manager::SecretManagerProvider;

use std::str::FromStr;

use google_cloud_storage::client::ClientConfig;
use google_cloud_storage::sign::SignBy;

use crate::config::GcsSettings;

/// 署名付きURLの署名方法。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignMode {
    /// クライアント設定に記録された既定値（鍵ファイル由来の秘密鍵等）を使う
    ClientDefault,
    /// PEM形式の秘密鍵でローカル署名する
    PrivateKey(Vec<u8>),
    /// IAM Credentials APIのsignBlobでリモート署名する
    SignBytes,
}

impl SignMode {
    pub(crate) fn to_sign_by(&self) -> Option<SignBy> {
        match self {
            SignMode::ClientDefault => None,
            SignMode::PrivateKey(pem) => Some(SignBy::PrivateKey(pem.clone())),
            SignMode::SignBytes => Some(SignBy::SignBytes),
        }
    }
}

/// 署名付きURLを発行できるプリンシパル。
pub struct SigningIdentity {
    /// 認証済みストレージクライアント設定
    pub config: ClientConfig,
    /// 署名者のサービスアカウントメール。Noneならクライアント設定の既定値
    pub google_access_id: Option<String>,
    /// 署名方法
    pub sign_mode: SignMode,
}

/// 認証情報取得エラー。
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Google認証ライブラリでの失敗
    #[error("認証情報の読み込みに失敗: {0}")]
    Auth(String),
    /// メタデータサーバーとの通信失敗
    #[error("メタデータサーバーへの問い合わせに失敗: {0}")]
    Metadata(String),
    /// Secret Managerとの通信失敗・ペイロード不正
    #[error("Secret Managerからの鍵取得に失敗: {0}")]
    SecretManager(String),
    /// チェーン内の全プロバイダが失敗
    #[error("利用可能な認証情報がありません: {0}")]
    Exhausted(String),
}

/// 署名用認証情報プロバイダ。
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// ログ出力用の名前。
    fn name(&self) -> &'static str;

    /// 署名に使うプリンシパルを取得する。起動時に一度だけ呼ばれる。
    async fn signing_identity(&self) -> Result<SigningIdentity, CredentialError>;
}

/// Application Default Credentials。
///
/// `GOOGLE_APPLICATION_CREDENTIALS` / `GOOGLE_APPLICATION_CREDENTIALS_JSON` /
/// メタデータサーバーの順に探索される。
pub struct AmbientDefaultProvider;

#[async_trait::async_trait]
impl CredentialProvider for AmbientDefaultProvider {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| CredentialError::Auth(e.to_string()))?;
        Ok(SigningIdentity {
            config,
            google_access_id: None,
            sign_mode: SignMode::ClientDefault,
        })
    }
}

/// 認証情報の取得元。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Default,
    KeyFile,
    Metadata,
    SecretManager,
    /// 記載順に試す。入れ子のチェーンは不可
    Chain(Vec<CredentialSource>),
}

impl CredentialSource {
    /// カンマ区切りのチェーン定義をパースする。
    pub fn parse_chain(s: &str) -> Result<Vec<CredentialSource>, String> {
        let sources = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.parse::<CredentialSource>()? {
                CredentialSource::Chain(_) => {
                    Err("チェーンの中にchainは指定できません".to_string())
                }
                source => Ok(source),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if sources.is_empty() {
            return Err("チェーンが空です".to_string());
        }
        Ok(sources)
    }
}

impl FromStr for CredentialSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(CredentialSource::Default),
            "key-file" => Ok(CredentialSource::KeyFile),
            "metadata" => Ok(CredentialSource::Metadata),
            "secret-manager" => Ok(CredentialSource::SecretManager),
            "chain" => Ok(CredentialSource::Chain(Vec::new())),
            other => Err(format!(
                "不明な認証情報ソース: {other}（default / key-file / metadata / secret-manager / chain）"
            )),
        }
    }
}

/// 設定で選ばれた取得元に対応するプロバイダを構築する。
///
/// 各取得元に必要な設定値の有無は設定読み込み時に検査済みであることを前提とする。
pub fn build_provider(
    source: &CredentialSource,
    settings: &GcsSettings,
    http: &reqwest::Client,
) -> Box<dyn CredentialProvider> {
    let metadata = || MetadataClient::new(http.clone(), &settings.metadata_host);

    match source {
        CredentialSource::Default => Box::new(AmbientDefaultProvider),
        CredentialSource::KeyFile => Box::new(KeyFileProvider::new(
            settings.key_file.clone().unwrap_or_default(),
        )),
        CredentialSource::Metadata => Box::new(MetadataProvider::new(metadata())),
        CredentialSource::SecretManager => {
            let secret = settings.secret.clone().unwrap_or_default();
            Box::new(SecretManagerProvider::new(
                metadata(),
                http.clone(),
                &settings.secret_manager_endpoint,
                secret,
            ))
        }
        CredentialSource::Chain(sources) => Box::new(ChainProvider::new(
            sources
                .iter()
                .map(|source| build_provider(source, settings, http))
                .collect(),
        )),
    }
}
