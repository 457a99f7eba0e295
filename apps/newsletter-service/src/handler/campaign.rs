//! # レシピ公開イベントハンドラ
//!
//! レシピ管理側からの公開通知を受け、キャンペーン配信を別タスクで開始する。
//!
//! ## エンドポイント
//!
//! ```text
//! POST /internal/recipes/published
//! ```
//!
//! 配信の完了は待たずに `202 Accepted` を返す。結果は配信ログと
//! `campaign.completed` イベントで確認する。

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use recipebox_domain::notification::PublishedRecipe;
use recipebox_shared::ApiResponse;
use serde::{Deserialize, Serialize};

use crate::{error::CoreError, usecase::CampaignDispatcher};

/// キャンペーン API の共有状態
pub struct CampaignState {
    pub dispatcher: Arc<CampaignDispatcher>,
}

/// レシピ公開リクエスト
#[derive(Debug, Deserialize)]
pub struct RecipePublishedRequest {
    pub id:           String,
    pub title:        String,
    #[serde(default)]
    pub description:  String,
    pub image_url:    Option<String>,
    pub cooking_time: u32,
    pub servings:     u32,
    pub calories:     u32,
}

/// 受付結果
#[derive(Debug, Serialize)]
pub struct CampaignAcceptedDto {
    pub recipe_id: String,
    pub status:    &'static str,
}

/// POST /internal/recipes/published
///
/// ## レスポンス
///
/// - `202 Accepted`: キャンペーンを開始した
/// - `400 Bad Request`: レシピ ID またはタイトルが空
pub async fn recipe_published(
    State(state): State<Arc<CampaignState>>,
    Json(req): Json<RecipePublishedRequest>,
) -> Result<impl IntoResponse, CoreError> {
    if req.id.trim().is_empty() || req.title.trim().is_empty() {
        return Err(CoreError::BadRequest(
            "レシピ ID とタイトルは必須です".to_string(),
        ));
    }

    let recipe = PublishedRecipe {
        id:           req.id,
        title:        req.title,
        description:  req.description,
        image_url:    req.image_url,
        cooking_time: req.cooking_time,
        servings:     req.servings,
        calories:     req.calories,
    };
    let recipe_id = recipe.id.clone();

    state.dispatcher.spawn(recipe);

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(CampaignAcceptedDto {
            recipe_id,
            status: "accepted",
        })),
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        Router,
        body::Body,
        http::{Method, Request, header},
        routing::post,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::test_utils::{NewsletterTestBuilder, NewsletterTestSetup};

    fn create_test_app(setup: &NewsletterTestSetup) -> Router {
        let state = Arc::new(CampaignState {
            dispatcher: setup.campaign.clone(),
        });

        Router::new()
            .route("/internal/recipes/published", post(recipe_published))
            .with_state(state)
    }

    fn publish_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/internal/recipes/published")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_recipe_published_202を返し配信は別タスクで進む() {
        let setup = NewsletterTestBuilder::new().build().await;
        setup
            .subscriber_repo
            .add(setup.builder.active_subscriber("a@example.com"));
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(publish_request(
                r#"{"id":"42","title":"親子丼","description":"<p>とろとろ</p>","image_url":null,"cooking_time":20,"servings":2,"calories":650}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["recipe_id"], "42");

        // 別タスクの配信完了を待つ
        for _ in 0..100 {
            if setup.delivery_log_repo.all().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(setup.transport.attempts_to("a@example.com"), 1);
    }

    #[tokio::test]
    async fn test_recipe_published_タイトルが空なら400() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(publish_request(
                r#"{"id":"42","title":" ","cooking_time":20,"servings":2,"calories":650}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(setup.transport_factory.create_calls(), 0);
    }
}
