//! 路由组装：Basic 认证保护的上传路由与逐请求追踪。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::head;
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth;
use crate::manager::CredentialManager;
use crate::storage::FileStore;
use crate::upload;

/// 用于日志的客户端地址：优先取 `x-forwarded-for` 首跳，否则为对端地址。
pub fn client_ip<B>(request: &Request<B>) -> String {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let connect_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    forwarded_ip
        .or(connect_ip)
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn build_router(manager: Arc<CredentialManager>, storage: Arc<FileStore>) -> Router {
    Router::new()
        .route(
            "/{file}",
            head(upload::head_file)
                .put(upload::put_file)
                .post(upload::post_file)
                .delete(upload::delete_file),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = client_ip(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(manager))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, StatusCode, header};
    use axum::response::Response;
    use axum_extra::headers::{Authorization, HeaderMapExt};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::fs_repository::FsCredentialRepository;

    const TEST_COST: u32 = 10;

    async fn make_app() -> (tempfile::TempDir, Router) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("data");
        let storage = Arc::new(FileStore::new(root.clone()));
        storage.ensure_root().await.expect("storage root");
        let repository = Arc::new(FsCredentialRepository::new(root));
        let manager = Arc::new(CredentialManager::new(
            repository,
            storage.clone(),
            TEST_COST,
        ));
        manager.add("alice", "Secret123").await.expect("add alice");
        (temp, build_router(manager, storage))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        credentials: Option<(&str, &str)>,
        body: &'static str,
    ) -> Response {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .expect("request");
        if let Some((username, password)) = credentials {
            request
                .headers_mut()
                .typed_insert(Authorization::basic(username, password));
        }
        app.clone().oneshot(request).await.expect("response")
    }

    const ALICE: Option<(&str, &str)> = Some(("alice", "Secret123"));

    fn content_length(response: &Response) -> &str {
        response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .expect("content-length")
    }

    #[tokio::test]
    async fn resumable_upload_scenario() {
        let (temp, app) = make_app().await;

        let res = send(&app, Method::HEAD, "/report.txt", ALICE, "").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(content_length(&res), "0");

        let res = send(&app, Method::PUT, "/report.txt", ALICE, "hello ").await;
        assert_eq!(res.status(), StatusCode::OK);
        let res = send(&app, Method::HEAD, "/report.txt", ALICE, "").await;
        assert_eq!(content_length(&res), "6");

        let res = send(&app, Method::PUT, "/report.txt", ALICE, "world").await;
        assert_eq!(res.status(), StatusCode::OK);
        let res = send(&app, Method::HEAD, "/report.txt", ALICE, "").await;
        assert_eq!(content_length(&res), "11");

        let res = send(&app, Method::POST, "/report.txt", ALICE, "").await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(&app, Method::PUT, "/report.txt", ALICE, "again").await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let res = send(&app, Method::POST, "/report.txt", ALICE, "").await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let res = send(&app, Method::HEAD, "/report.txt", ALICE, "").await;
        assert_eq!(content_length(&res), "11");

        let stored = std::fs::read(temp.path().join("data/alice/report.txt")).expect("closed file");
        assert_eq!(stored, b"hello world");
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_credentials_on_every_verb() {
        let (_temp, app) = make_app().await;
        let attempts = [
            None,
            Some(("alice", "Wrong1234")),
            Some(("mallory", "Secret123")),
            Some(("bad name!", "Secret123")),
        ];
        for credentials in attempts {
            for method in [
                Method::HEAD,
                Method::PUT,
                Method::POST,
                Method::DELETE,
                Method::GET,
            ] {
                let res = send(&app, method.clone(), "/report.txt", credentials, "x").await;
                assert_eq!(
                    res.status(),
                    StatusCode::UNAUTHORIZED,
                    "{method} with {credentials:?}"
                );
                assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
            }
        }
    }

    #[tokio::test]
    async fn malformed_authorization_is_unauthorized() {
        let (_temp, app) = make_app().await;
        let values = [
            "Bearer abc",
            "Basic !!!notbase64",
            "Basic YWxpY2U=",
            "Digest x=y",
            "Basic",
        ];
        for value in values {
            for method in [Method::HEAD, Method::PUT, Method::POST, Method::DELETE] {
                let request = Request::builder()
                    .method(method.clone())
                    .uri("/report.txt")
                    .header(header::AUTHORIZATION, value)
                    .body(Body::from("x"))
                    .expect("request");
                let res = app.clone().oneshot(request).await.expect("response");
                assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{method} with {value}");
                assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
            }
        }
    }

    #[tokio::test]
    async fn close_without_upload_fails() {
        let (_temp, app) = make_app().await;
        let res = send(&app, Method::POST, "/never.bin", ALICE, "").await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn file_name_checks() {
        let (temp, app) = make_app().await;

        let res = send(&app, Method::HEAD, "/.credentials", ALICE, "").await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = send(&app, Method::PUT, "/.credentials", ALICE, "{}").await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let res = send(&app, Method::PUT, "/notes.part", ALICE, "x").await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let credentials =
            std::fs::read_to_string(temp.path().join("data/alice/.credentials")).expect("read");
        assert!(credentials.contains("\"username\": \"alice\""));
    }

    #[tokio::test]
    async fn delete_is_acknowledged_noop() {
        let (temp, app) = make_app().await;
        send(&app, Method::PUT, "/keep.txt", ALICE, "data").await;

        let res = send(&app, Method::DELETE, "/keep.txt", ALICE, "").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(temp.path().join("data/alice/keep.txt.part").exists());
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .expect("request");
        assert_eq!(client_ip(&request), "203.0.113.7");

        let request = Request::builder().body(()).expect("request");
        assert_eq!(client_ip(&request), "unknown");
    }
}
