//! # 購読者の管理
//!
//! 管理画面向けの購読者一覧・統計・削除と、未確認購読者の保持期間による削除。
//!
//! ## 設計方針
//!
//! - **削除は物理削除**: 配信ログは購読者 ID を保持したまま残る
//! - **保持期間の削除は外部から起動する**: サービス内にスケジューラは持たない

use std::sync::Arc;

use recipebox_domain::{
    clock::Clock,
    subscriber::{Subscriber, SubscriberId, SubscriberStatus, retention_cutoff},
};
use recipebox_infra::repository::{SubscriberCounts, SubscriberRepository};
use recipebox_shared::{PageRequest, PaginatedResponse, event_log::event, log_business_event};

use crate::error::CoreError;

/// 購読者管理ユースケース
pub struct SubscriberAdminUseCaseImpl {
    subscriber_repo: Arc<dyn SubscriberRepository>,
    clock:           Arc<dyn Clock>,
}

impl SubscriberAdminUseCaseImpl {
    pub fn new(subscriber_repo: Arc<dyn SubscriberRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriber_repo,
            clock,
        }
    }

    /// 購読者を新しい順に取得する
    pub async fn list_subscribers(
        &self,
        status: Option<SubscriberStatus>,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Subscriber>, CoreError> {
        let (subscribers, total) = self
            .subscriber_repo
            .list(status, page.limit(), page.offset())
            .await?;

        Ok(PaginatedResponse::new(subscribers, page, total))
    }

    /// ステータスごとの購読者数
    pub async fn stats(&self) -> Result<SubscriberCounts, CoreError> {
        Ok(self.subscriber_repo.count_by_status().await?)
    }

    /// 購読者を削除する
    pub async fn delete_subscriber(&self, id: &SubscriberId) -> Result<(), CoreError> {
        if !self.subscriber_repo.delete(id).await? {
            return Err(CoreError::NotFound("購読者が見つかりません".to_string()));
        }

        tracing::info!(subscriber_id = %id, "購読者を削除しました");
        Ok(())
    }

    /// 保持期間（7 日）を過ぎた未確認の購読者を削除する
    ///
    /// 削除した件数を返す。
    pub async fn purge_unverified(&self) -> Result<u64, CoreError> {
        let cutoff = retention_cutoff(self.clock.now());
        let removed = self.subscriber_repo.delete_unverified_before(cutoff).await?;

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = event::action::RETENTION_SWEEP,
            event.entity_type = event::entity_type::SUBSCRIBER,
            event.result = event::result::SUCCESS,
            retention.cutoff = %cutoff,
            retention.removed = removed,
            "未確認の購読者を削除しました"
        );

        Ok(removed)
    }
}
