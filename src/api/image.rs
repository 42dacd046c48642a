//! Hardened image proxy.
//!
//! The single egress boundary for client-visible images. Only the one
//! allow-listed host may be fetched, matched exactly against the parsed URL
//! host so lookalike prefixes and substrings never pass.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use serde::Deserialize;
use url::Url;

use crate::AppState;
use crate::error::AppError;

/// Cache directive for proxied images: source images are effectively
/// immutable, so clients may keep them for a week and revalidate lazily.
const CACHE_CONTROL: &str = "public, max-age=604800, stale-while-revalidate=86400";

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    #[serde(default)]
    pub url: Option<String>,
}

/// GET /api/image?url=...
pub async fn proxy_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Result<Response, AppError> {
    let raw = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing url parameter".to_string()))?;

    let upstream =
        Url::parse(raw).map_err(|_| AppError::BadRequest("Invalid url parameter".to_string()))?;

    let host = upstream
        .host_str()
        .ok_or_else(|| AppError::BadRequest("url has no host".to_string()))?;

    // Exact host match only. Prefix or substring comparison would reopen the
    // proxy to lookalike domains.
    if host != state.config.images.allowed_host {
        tracing::warn!(host = %host, "Rejected proxy fetch for disallowed host");
        return Err(AppError::Forbidden(format!(
            "Host '{host}' is not an allowed image origin"
        )));
    }

    let resp = state
        .image_client
        .get(upstream.clone())
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(url = %upstream, "Upstream image fetch timed out");
                AppError::GatewayTimeout("Upstream image fetch timed out".to_string())
            } else {
                tracing::warn!(url = %upstream, error = %e, "Upstream image fetch failed");
                AppError::Upstream("Upstream image fetch failed".to_string())
            }
        })?;

    let status = resp.status();
    if !status.is_success() {
        tracing::debug!(url = %upstream, status = %status, "Upstream returned non-success");
        return Err(AppError::UpstreamStatus {
            status: status.as_u16(),
        });
    }

    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, CACHE_CONTROL)
        .body(Body::from_stream(resp.bytes_stream()))
        .map_err(|e| AppError::Internal(format!("Failed to build proxy response: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::test_support::test_state;

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/api/image", get(proxy_image))
            .with_state(state)
    }

    async fn get_response(app: Router, uri: &str) -> axum::http::Response<Body> {
        let req = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let state = test_state();
        let resp = get_response(app(state), "/api/image").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unparseable_url_is_bad_request() {
        let state = test_state();
        let resp = get_response(app(state), "/api/image?url=not%20a%20url").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disallowed_host_is_forbidden() {
        let state = test_state();
        let resp = get_response(
            app(state),
            "/api/image?url=https%3A%2F%2Fevil.example.com%2Fimg.jpg",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_lookalike_host_is_forbidden() {
        // Prefix of the allow-listed host must not pass: exact match only.
        let mut state = test_state();
        let mut config = (*state.config).clone();
        config.images.allowed_host = "upload.wikimedia.org".to_string();
        state.config = std::sync::Arc::new(config);

        for url in [
            "https://upload.wikimedia.org.evil.com/img.jpg",
            "https://evil-upload.wikimedia.org.attacker.net/img.jpg",
            "https://xupload.wikimedia.org/img.jpg",
        ] {
            let uri = format!("/api/image?url={}", urlencoding::encode(url));
            let resp = get_response(app(state.clone()), &uri).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "url: {url}");
        }
    }

    #[tokio::test]
    async fn test_allowed_host_streams_bytes_with_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]),
            )
            .mount(&server)
            .await;

        // Allow-list the mock server's host:port.
        let server_url = Url::parse(&server.uri()).unwrap();
        let host = server_url.host_str().unwrap().to_string();

        let mut state = test_state();
        let mut config = (*state.config).clone();
        config.images.allowed_host = host;
        state.config = std::sync::Arc::new(config);

        let upstream = format!("{}/img.png", server.uri());
        let uri = format!("/api/image?url={}", urlencoding::encode(&upstream));
        let resp = get_response(app(state), &uri).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).unwrap(),
            CACHE_CONTROL
        );

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), &[0x89, 0x50, 0x4e, 0x47]);
    }

    #[tokio::test]
    async fn test_upstream_status_proxied_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let server_url = Url::parse(&server.uri()).unwrap();
        let mut state = test_state();
        let mut config = (*state.config).clone();
        config.images.allowed_host = server_url.host_str().unwrap().to_string();
        state.config = std::sync::Arc::new(config);

        let upstream = format!("{}/missing.jpg", server.uri());
        let uri = format!("/api/image?url={}", urlencoding::encode(&upstream));
        let resp = get_response(app(state), &uri).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_content_type_defaults_to_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .mount(&server)
            .await;

        let server_url = Url::parse(&server.uri()).unwrap();
        let mut state = test_state();
        let mut config = (*state.config).clone();
        config.images.allowed_host = server_url.host_str().unwrap().to_string();
        state.config = std::sync::Arc::new(config);

        let upstream = format!("{}/img", server.uri());
        let uri = format!("/api/image?url={}", urlencoding::encode(&upstream));
        let resp = get_response(app(state), &uri).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            DEFAULT_CONTENT_TYPE
        );
    }
}
