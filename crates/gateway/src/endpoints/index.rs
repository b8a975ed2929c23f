//! # GET / と GET /healthz

use axum::response::Html;

/// GET /: アップロード画面。
///
/// テンプレート描画は行わず、埋め込みの静的HTMLを返す。
pub async fn handle_index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

/// GET /healthz: 死活監視。
pub async fn handle_healthz() -> &'static str {
    "ok"
}
