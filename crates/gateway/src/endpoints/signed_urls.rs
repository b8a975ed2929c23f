//! # POST /generate_signed_urls
//!
//! アップロード者情報とファイル一覧を検証し、ファイルごとの署名付きPUT URLを発行する。

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use upload_types::{SignedUrlsResponse, UploadRequest};

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::validation::{is_allowed_extension, object_name, sanitize_identity, secure_filename};

/// POST /generate_signed_urls: 署名付きURL発行。
///
/// JSONとして解釈できないボディも入力不正（400）として扱う。
pub async fn handle_generate_signed_urls(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<SignedUrlsResponse>, GatewayError> {
    let Json(body) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "リクエストボディのパースに失敗");
        GatewayError::invalid_input()
    })?;

    generate_signed_urls(&state, body).await.map(Json)
}

/// 検証と署名の本体。
///
/// ファイルは先頭から順に 検証 → 署名 し、最初の失敗で打ち切る。
/// 失敗時はそれまでに生成したURLを破棄し、部分的な結果は返さない。
pub async fn generate_signed_urls(
    state: &GatewayState,
    body: UploadRequest,
) -> Result<SignedUrlsResponse, GatewayError> {
    let name = sanitize_identity(body.name.as_deref())?;
    let email = sanitize_identity(body.email.as_deref())?;
    state.relative_path_policy.check_uploader(&name)?;

    if body.files.is_empty() {
        return Err(GatewayError::invalid_input());
    }

    let mut signed_urls = BTreeMap::new();

    for file in &body.files {
        let filename = secure_filename(&file.name);
        if !is_allowed_extension(&filename) {
            tracing::info!(uploader = %name, filename = %filename, "許可されていない拡張子");
            return Err(GatewayError::UnsupportedFileType(filename));
        }

        state.relative_path_policy.check(&file.relative_path)?;

        let object = object_name(&state.upload_prefix, &name, &file.relative_path);
        let url = state
            .signer
            .sign_upload_url(&object, state.presign_expiry_secs)
            .await?;

        tracing::debug!(object_name = %object, "署名付きURLを生成");
        signed_urls.insert(file.relative_path.clone(), url);
    }

    tracing::info!(uploader = %name, files = signed_urls.len(), "署名付きURLを発行しました");
    tracing::debug!(uploader = %name, email = %email, "アップロード者の連絡先");

    Ok(SignedUrlsResponse { signed_urls })
}
