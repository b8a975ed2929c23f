//! # Gatewayエンドポイント
//!
//! - `GET /`: アップロード画面（静的HTML）
//! - `POST /generate_signed_urls`: 署名付きURL発行
//! - `GET /healthz`: 死活監視

pub mod index;
pub mod signed_urls;

pub use index::{handle_healthz, handle_index};
pub use signed_urls::handle_generate_signed_urls;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::config::GatewayState;

/// Gatewayのルーターを構築する。
pub fn router(state: Arc<GatewayState>, max_request_body_bytes: usize) -> axum::Router {
    axum::Router::new()
        .route("/", get(handle_index))
        .route("/healthz", get(handle_healthz))
        .route("/generate_signed_urls", post(handle_generate_signed_urls))
        .layer(DefaultBodyLimit::max(max_request_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
