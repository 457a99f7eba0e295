//! # 購読ハンドラ
//!
//! 購読フォームとメール内リンクから呼ばれる公開 API。
//!
//! ## エンドポイント
//!
//! - `POST /newsletter/subscribe` - 購読の申し込み
//! - `GET /newsletter/verify/{token}` - 確認リンク
//! - `GET /newsletter/unsubscribe/{token}` - 配信停止リンク
//! - `POST /newsletter/unsubscribe` - メールアドレスによる配信停止
//!
//! どのエンドポイントも結果メッセージだけを返し、購読者の内部状態は返さない。

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use recipebox_shared::ApiResponse;
use serde::Deserialize;

use crate::{error::CoreError, usecase::SubscriptionUseCaseImpl};

/// 購読 API の共有状態
pub struct SubscriptionState {
    pub usecase: Arc<SubscriptionUseCaseImpl>,
}

/// メールアドレスを受け取るリクエスト
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// POST /newsletter/subscribe
///
/// ## レスポンス
///
/// - `200 OK`: 確認メールを送信した
/// - `400 Bad Request`: メールアドレスの形式が不正
/// - `409 Conflict`: 既に購読中
pub async fn subscribe(
    State(state): State<Arc<SubscriptionState>>,
    Json(req): Json<EmailRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let message = state.usecase.subscribe(&req.email).await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(message))))
}

/// GET /newsletter/verify/{token}
///
/// ## レスポンス
///
/// - `200 OK`: 確認完了（確認済みのトークンでも同じ）
/// - `404 Not Found`: トークンが不明
/// - `410 Gone`: トークンの有効期限切れ
pub async fn verify(
    State(state): State<Arc<SubscriptionState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let message = state.usecase.verify(&token).await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(message))))
}

/// GET /newsletter/unsubscribe/{token}
pub async fn unsubscribe_by_token(
    State(state): State<Arc<SubscriptionState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let message = state.usecase.unsubscribe_by_token(&token).await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(message))))
}

/// POST /newsletter/unsubscribe
pub async fn unsubscribe_by_email(
    State(state): State<Arc<SubscriptionState>>,
    Json(req): Json<EmailRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let message = state.usecase.unsubscribe_by_email(&req.email).await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(message))))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, header},
        routing::{get, post},
    };
    use chrono::Duration;
    use tower::ServiceExt;

    use super::*;
    use crate::test_utils::{NewsletterTestBuilder, NewsletterTestSetup};

    fn create_test_app(setup: &NewsletterTestSetup) -> Router {
        let state = Arc::new(SubscriptionState {
            usecase: setup.subscription.clone(),
        });

        Router::new()
            .route("/newsletter/subscribe", post(subscribe))
            .route("/newsletter/verify/{token}", get(verify))
            .route("/newsletter/unsubscribe/{token}", get(unsubscribe_by_token))
            .route("/newsletter/unsubscribe", post(unsubscribe_by_email))
            .with_state(state)
    }

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_確認メッセージを返す() {
        // Given
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        // When
        let response = sut
            .oneshot(json_request(
                "/newsletter/subscribe",
                r#"{"email":"a@example.com"}"#,
            ))
            .await
            .unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["data"]["message"].as_str().unwrap().contains("確認メール"));
        assert!(json["data"].get("verification_token").is_none());
    }

    #[tokio::test]
    async fn test_subscribe_不正なメールアドレスは400() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(json_request("/newsletter/subscribe", r#"{"email":"invalid"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["status"], 400);
    }

    #[tokio::test]
    async fn test_subscribe_購読中のアドレスは409() {
        let setup = NewsletterTestBuilder::new().build().await;
        setup
            .subscriber_repo
            .add(setup.builder.active_subscriber("a@example.com"));
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(json_request(
                "/newsletter/subscribe",
                r#"{"email":"a@example.com"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_verify_不明なトークンは404() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(get_request("/newsletter/verify/unknown"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_verify_期限切れのトークンは410() {
        let setup = NewsletterTestBuilder::new().build().await;
        let subscriber = setup.builder.pending_subscriber("a@example.com");
        let token = subscriber.verification_token().unwrap().to_string();
        setup.subscriber_repo.add(subscriber);
        setup.clock.advance(Duration::hours(25));
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(get_request(&format!("/newsletter/verify/{token}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_unsubscribe_by_token_配信を停止する() {
        let setup = NewsletterTestBuilder::new().build().await;
        let subscriber = setup.builder.active_subscriber("a@example.com");
        let token = subscriber.unsubscribe_token().unwrap().to_string();
        setup.subscriber_repo.add(subscriber);
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(get_request(&format!("/newsletter/unsubscribe/{token}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!setup.subscriber_repo.all()[0].is_campaign_recipient());
    }

    #[tokio::test]
    async fn test_unsubscribe_by_email_未登録のアドレスは404() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(json_request(
                "/newsletter/unsubscribe",
                r#"{"email":"nobody@example.com"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
