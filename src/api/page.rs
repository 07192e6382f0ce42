//! Built-in control page

use axum::{Router, response::Html, routing::get};

const INDEX_HTML: &str = include_str!("../../assets/index.html");

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Serve the embedded control page at `/`
pub fn router() -> Router {
    Router::new().route("/", get(index))
}
