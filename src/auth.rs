//! 所有路由前置的 HTTP Basic 认证。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::Request;
use axum::{middleware, response::Response};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Basic};
use axum_extra::typed_header::TypedHeaderRejection;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::manager::{AuthError, CredentialManager};

/// 当前请求 `Authorization` 头所证明的用户名。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// 认证中间件：通过凭据管理器校验 Basic 认证，并将请求限定到该用户。
pub async fn auth_middleware(
    Extension(manager): Extension<Arc<CredentialManager>>,
    auth_header: Result<TypedHeader<Authorization<Basic>>, TypedHeaderRejection>,
    mut req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    let TypedHeader(credentials) = match auth_header {
        Ok(header) => header,
        Err(rejection) => {
            debug!(reason = %rejection, "missing or malformed basic credentials");
            return Err(ApiError::Unauthorized);
        }
    };

    let username = credentials.username();
    match manager
        .check_password(username, credentials.password())
        .await
    {
        Ok(true) => {
            req.extensions_mut()
                .insert(AuthenticatedUser(username.to_string()));
            Ok(next.run(req).await)
        }
        Ok(false) => {
            debug!(username, "rejected credentials");
            Err(ApiError::Unauthorized)
        }
        Err(
            err @ (AuthError::NotFound
            | AuthError::InvalidUsername
            | AuthError::InvalidUsernameOrPassword),
        ) => {
            debug!(username, error = %err, "rejected credentials");
            Err(ApiError::Unauthorized)
        }
        Err(err) => {
            warn!(username, error = %err, "credential check failed");
            Err(ApiError::Unauthorized)
        }
    }
}
