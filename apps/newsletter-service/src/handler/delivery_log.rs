//! # 配信ログハンドラ
//!
//! ## エンドポイント
//!
//! - `GET /internal/delivery-logs` - 絞り込み・ページ指定付きの一覧
//! - `GET /internal/delivery-logs/stats` - ステータスごとの件数と成功率
//!
//! ## クエリパラメータ（一覧）
//!
//! | 名前 | 説明 |
//! |------|------|
//! | `status` | `sent` / `failed` / `pending` |
//! | `recipient` | 宛先の部分一致 |
//! | `template_id` | テンプレート ID |
//! | `from`, `to` | 作成日時の範囲（RFC 3339） |
//! | `page`, `per_page` | ページ指定（`per_page` は最大 100） |

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use recipebox_domain::{
    delivery_log::{DeliveryLog, DeliveryLogFilter, DeliveryStatus},
    email_template::EmailTemplateId,
};
use recipebox_shared::{ApiResponse, PageRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::CoreError, usecase::DeliveryLogUseCaseImpl};

/// 配信ログ API の共有状態
pub struct DeliveryLogState {
    pub usecase: Arc<DeliveryLogUseCaseImpl>,
}

/// 一覧のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct DeliveryLogQuery {
    pub status:      Option<DeliveryStatus>,
    pub recipient:   Option<String>,
    pub template_id: Option<Uuid>,
    pub from:        Option<DateTime<Utc>>,
    pub to:          Option<DateTime<Utc>>,
    pub page:        Option<u32>,
    pub per_page:    Option<u32>,
}

/// 配信ログ DTO
#[derive(Debug, Serialize)]
pub struct DeliveryLogDto {
    pub id:            Uuid,
    pub subscriber_id: Option<Uuid>,
    pub recipient:     String,
    pub subject:       String,
    pub template_id:   Option<Uuid>,
    pub status:        DeliveryStatus,
    pub error:         Option<String>,
    pub sent_at:       Option<String>,
    pub created_at:    String,
}

impl From<DeliveryLog> for DeliveryLogDto {
    fn from(log: DeliveryLog) -> Self {
        Self {
            id:            *log.id.as_uuid(),
            subscriber_id: log.subscriber_id.map(|id| *id.as_uuid()),
            recipient:     log.recipient,
            subject:       log.subject,
            template_id:   log.template_id.map(|id| *id.as_uuid()),
            status:        log.status,
            error:         log.error,
            sent_at:       log.sent_at.map(|at| at.to_rfc3339()),
            created_at:    log.created_at.to_rfc3339(),
        }
    }
}

/// GET /internal/delivery-logs
pub async fn list_delivery_logs(
    State(state): State<Arc<DeliveryLogState>>,
    Query(query): Query<DeliveryLogQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let filter = DeliveryLogFilter {
        status:      query.status,
        recipient:   query.recipient.filter(|r| !r.trim().is_empty()),
        template_id: query.template_id.map(EmailTemplateId::from_uuid),
        from:        query.from,
        to:          query.to,
    };
    let page = PageRequest::new(query.page, query.per_page);

    let logs = state
        .usecase
        .list_logs(filter, page)
        .await?
        .map(DeliveryLogDto::from);

    Ok((StatusCode::OK, Json(logs)))
}

/// GET /internal/delivery-logs/stats
pub async fn get_delivery_stats(
    State(state): State<Arc<DeliveryLogState>>,
) -> Result<impl IntoResponse, CoreError> {
    let stats = state.usecase.stats().await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(stats))))
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::Request, routing::get};
    use recipebox_domain::notification::PublishedRecipe;
    use tower::ServiceExt;

    use super::*;
    use crate::test_utils::{NewsletterTestBuilder, NewsletterTestSetup};

    fn create_test_app(setup: &NewsletterTestSetup) -> Router {
        let state = Arc::new(DeliveryLogState {
            usecase: setup.delivery_logs.clone(),
        });

        Router::new()
            .route("/internal/delivery-logs", get(list_delivery_logs))
            .route("/internal/delivery-logs/stats", get(get_delivery_stats))
            .with_state(state)
    }

    async fn get_json(sut: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = sut
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    /// 成功 2 件・失敗 1 件の配信ログを作る
    async fn setup_with_logs() -> NewsletterTestSetup {
        let setup = NewsletterTestBuilder::new().build().await;
        for email in ["a@example.com", "b@example.com", "c@example.org"] {
            setup.subscriber_repo.add(setup.builder.active_subscriber(email));
        }
        setup.transport.fail_for("c@example.org");
        setup
            .campaign
            .run(PublishedRecipe {
                id:           "7".to_string(),
                title:        "ぶり大根".to_string(),
                description:  "冬の定番".to_string(),
                image_url:    None,
                cooking_time: 40,
                servings:     3,
                calories:     320,
            })
            .await
            .unwrap();
        setup
    }

    #[tokio::test]
    async fn test_list_delivery_logs_ステータスで絞り込める() {
        let setup = setup_with_logs().await;

        let (status, json) = get_json(
            create_test_app(&setup),
            "/internal/delivery-logs?status=failed",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);
        assert_eq!(json["data"][0]["recipient"], "c@example.org");
        assert_eq!(json["data"][0]["status"], "failed");
    }

    #[tokio::test]
    async fn test_list_delivery_logs_ページ情報を返す() {
        let setup = setup_with_logs().await;

        let (status, json) = get_json(
            create_test_app(&setup),
            "/internal/delivery-logs?page=1&per_page=2",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
        assert_eq!(json["total"], 3);
        assert_eq!(json["total_pages"], 2);
    }

    #[tokio::test]
    async fn test_list_delivery_logs_不正なステータスは400() {
        let setup = NewsletterTestBuilder::new().build().await;

        let (status, _) = get_json(
            create_test_app(&setup),
            "/internal/delivery-logs?status=bounced",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_delivery_stats_件数と成功率を返す() {
        let setup = setup_with_logs().await;

        let (status, json) =
            get_json(create_test_app(&setup), "/internal/delivery-logs/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["total"], 3);
        assert_eq!(json["data"]["sent"], 2);
        assert_eq!(json["data"]["failed"], 1);
        assert_eq!(json["data"]["success_rate"], 66.67);
    }
}
