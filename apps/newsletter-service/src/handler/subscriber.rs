//! # 購読者管理ハンドラ
//!
//! ## エンドポイント
//!
//! - `GET /internal/subscribers` - 一覧（`status`, `page`, `per_page`）
//! - `GET /internal/subscribers/stats` - ステータスごとの件数
//! - `DELETE /internal/subscribers/{id}` - 削除
//! - `POST /internal/subscribers/purge-unverified` - 保持期間を過ぎた未確認購読者の削除
//!
//! トークンはレスポンスに含めない。

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use recipebox_domain::subscriber::{Subscriber, SubscriberId, SubscriberStatus};
use recipebox_shared::{ApiResponse, PageRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::CoreError, usecase::SubscriberAdminUseCaseImpl};

/// 購読者管理 API の共有状態
pub struct SubscriberState {
    pub usecase: Arc<SubscriberAdminUseCaseImpl>,
}

/// 一覧のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct SubscriberListQuery {
    pub status:   Option<SubscriberStatus>,
    pub page:     Option<u32>,
    pub per_page: Option<u32>,
}

/// 購読者 DTO
#[derive(Debug, Serialize)]
pub struct SubscriberDto {
    pub id:              Uuid,
    pub email:           String,
    pub status:          SubscriberStatus,
    pub verified:        bool,
    pub verified_at:     Option<String>,
    pub subscribed_date: String,
    pub created_at:      String,
    pub updated_at:      String,
}

impl From<Subscriber> for SubscriberDto {
    fn from(subscriber: Subscriber) -> Self {
        Self {
            id:              *subscriber.id().as_uuid(),
            email:           subscriber.email().to_string(),
            status:          subscriber.status(),
            verified:        subscriber.verified(),
            verified_at:     subscriber.verified_at().map(|at| at.to_rfc3339()),
            subscribed_date: subscriber.subscribed_date().to_rfc3339(),
            created_at:      subscriber.created_at().to_rfc3339(),
            updated_at:      subscriber.updated_at().to_rfc3339(),
        }
    }
}

/// 保持期間による削除の結果
#[derive(Debug, Serialize)]
pub struct PurgeResultDto {
    pub removed: u64,
}

/// GET /internal/subscribers
pub async fn list_subscribers(
    State(state): State<Arc<SubscriberState>>,
    Query(query): Query<SubscriberListQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let page = PageRequest::new(query.page, query.per_page);

    let subscribers = state
        .usecase
        .list_subscribers(query.status, page)
        .await?
        .map(SubscriberDto::from);

    Ok((StatusCode::OK, Json(subscribers)))
}

/// GET /internal/subscribers/stats
pub async fn get_subscriber_stats(
    State(state): State<Arc<SubscriberState>>,
) -> Result<impl IntoResponse, CoreError> {
    let stats = state.usecase.stats().await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(stats))))
}

/// DELETE /internal/subscribers/{id}
///
/// ## レスポンス
///
/// - `204 No Content`: 削除成功
/// - `404 Not Found`: 購読者が見つからない
pub async fn delete_subscriber(
    State(state): State<Arc<SubscriberState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, CoreError> {
    state
        .usecase
        .delete_subscriber(&SubscriberId::from_uuid(id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /internal/subscribers/purge-unverified
pub async fn purge_unverified_subscribers(
    State(state): State<Arc<SubscriberState>>,
) -> Result<impl IntoResponse, CoreError> {
    let removed = state.usecase.purge_unverified().await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(PurgeResultDto { removed })),
    ))
}
