//! API route definitions.
//!
//! Every posting route is nested under `/entities/{entity_id}`. Mutations keyed by
//! the caller answer 201 on first execution and 200 when the stored result is
//! replayed.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{AppState, middleware::auth::auth_middleware};
use defter_core::idempotency::Idempotent;

pub mod bank;
pub mod health;
pub mod journals;
pub mod recognition;
pub mod reference;
pub mod settlements;

/// Creates the API router with protected routes that need state for middleware.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    // Protected routes that require authentication
    let protected_routes = Router::new()
        .merge(settlements::routes())
        .merge(journals::routes())
        .merge(recognition::routes())
        .merge(bank::routes())
        .merge(reference::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(health::routes())
        .merge(protected_routes)
}

/// 201 for a fresh result, 200 for a replay.
pub(crate) fn idempotent_response<T: Serialize>(result: Idempotent<T>) -> Response {
    let status = if result.replay {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (status, Json(result)).into_response()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Router harness for handler tests that never reach the database.

    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Request, header::AUTHORIZATION},
        response::Response,
    };
    use http_body_util::BodyExt;
    use sea_orm::DatabaseConnection;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{AppState, create_router};
    use defter_shared::config::JwtConfig;
    use defter_shared::{JwtService, PostingConfig};

    pub fn state() -> AppState {
        AppState {
            db: Arc::new(DatabaseConnection::Disconnected),
            jwt_service: Arc::new(JwtService::new(&JwtConfig {
                secret: "route-test-secret".to_string(),
                access_token_expiry_secs: 900,
            })),
            posting: PostingConfig::default(),
        }
    }

    pub fn token(state: &AppState, entity: Uuid, role: &str) -> String {
        state
            .jwt_service
            .issue_access_token(Uuid::new_v4(), Uuid::new_v4(), vec![entity], role)
            .expect("should issue token")
    }

    pub async fn send(
        state: AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        create_router(state)
            .oneshot(builder.body(body).expect("valid request"))
            .await
            .expect("router responds")
    }

    pub async fn json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
