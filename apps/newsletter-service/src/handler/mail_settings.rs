//! # 送信設定ハンドラ
//!
//! 管理画面向けの送信用メールアカウント設定 API。
//!
//! ## エンドポイント
//!
//! - `GET /internal/mail-settings` - 現在の設定（パスワードは `has_secret` のみ）
//! - `PATCH /internal/mail-settings` - 部分更新
//! - `POST /internal/mail-settings/test` - 接続テスト

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use recipebox_shared::ApiResponse;
use serde::Deserialize;

use crate::{
    error::CoreError,
    usecase::{MailSettingsUseCaseImpl, UpdateMailSettingsInput},
};

/// 送信設定 API の共有状態
pub struct MailSettingsState {
    pub usecase: Arc<MailSettingsUseCaseImpl>,
}

/// 送信設定の更新リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateMailSettingsRequest {
    pub host:       Option<String>,
    pub port:       Option<u16>,
    pub secure:     Option<bool>,
    pub username:   Option<String>,
    pub password:   Option<String>,
    pub from_name:  Option<String>,
    pub from_email: Option<String>,
    pub enabled:    Option<bool>,
}

/// GET /internal/mail-settings
pub async fn get_mail_settings(
    State(state): State<Arc<MailSettingsState>>,
) -> Result<impl IntoResponse, CoreError> {
    let settings = state.usecase.get_settings().await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(settings))))
}

/// PATCH /internal/mail-settings
///
/// ## レスポンス
///
/// - `200 OK`: 更新後の設定
/// - `400 Bad Request`: 入力不正、またはパスフレーズ未設定でパスワードを保存できない
pub async fn update_mail_settings(
    State(state): State<Arc<MailSettingsState>>,
    Json(req): Json<UpdateMailSettingsRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let input = UpdateMailSettingsInput {
        host:       req.host,
        port:       req.port,
        secure:     req.secure,
        username:   req.username,
        password:   req.password,
        from_name:  req.from_name,
        from_email: req.from_email,
        enabled:    req.enabled,
    };

    let settings = state.usecase.update_settings(input).await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(settings))))
}

/// POST /internal/mail-settings/test
///
/// 接続に失敗しても `200 OK` で `success: false` と失敗分類を返す。
pub async fn test_mail_connection(
    State(state): State<Arc<MailSettingsState>>,
) -> Result<impl IntoResponse, CoreError> {
    let result = state.usecase.test_connection().await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(result))))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, header},
        routing::{get, post},
    };
    use recipebox_domain::notification::{ConnectionFailureKind, ConnectionTestResult};
    use tower::ServiceExt;

    use super::*;
    use crate::test_utils::{NewsletterTestBuilder, NewsletterTestSetup};

    fn create_test_app(setup: &NewsletterTestSetup) -> Router {
        let state = Arc::new(MailSettingsState {
            usecase: setup.mail_settings.clone(),
        });

        Router::new()
            .route(
                "/internal/mail-settings",
                get(get_mail_settings).patch(update_mail_settings),
            )
            .route("/internal/mail-settings/test", post(test_mail_connection))
            .with_state(state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_get_mail_settings_パスワードを返さない() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(
                Request::builder()
                    .uri("/internal/mail-settings")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["host"], "smtp.example.com");
        assert_eq!(json["data"]["has_secret"], true);
        assert!(json["data"].get("encrypted_password").is_none());
        assert!(json["data"].get("password").is_none());
    }

    #[tokio::test]
    async fn test_update_mail_settings_部分更新できる() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(
                Request::builder()
                    .method(Method::PATCH)
                    .uri("/internal/mail-settings")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"port":465,"secure":true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["port"], 465);
        assert_eq!(json["data"]["secure"], true);
        assert_eq!(json["data"]["username"], "news@example.com");
    }

    #[tokio::test]
    async fn test_test_mail_connection_失敗分類を返す() {
        let setup = NewsletterTestBuilder::new().build().await;
        setup
            .transport_factory
            .set_connection_test_result(ConnectionTestResult::failed(
                ConnectionFailureKind::Timeout,
                "接続がタイムアウトしました",
            ));
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/internal/mail-settings/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["success"], false);
        assert_eq!(json["data"]["failure_kind"], "timeout");
    }
}
