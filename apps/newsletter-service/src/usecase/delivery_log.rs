//! 配信ログの参照ユースケース

use std::sync::Arc;

use recipebox_domain::delivery_log::{DeliveryLog, DeliveryLogFilter, DeliveryStats};
use recipebox_infra::repository::DeliveryLogRepository;
use recipebox_shared::{PageRequest, PaginatedResponse};

use crate::error::CoreError;

/// 配信ログの参照ユースケース
pub struct DeliveryLogUseCaseImpl {
    delivery_log_repo: Arc<dyn DeliveryLogRepository>,
}

impl DeliveryLogUseCaseImpl {
    pub fn new(delivery_log_repo: Arc<dyn DeliveryLogRepository>) -> Self {
        Self { delivery_log_repo }
    }

    /// 条件に一致する配信ログを新しい順に取得する
    pub async fn list_logs(
        &self,
        filter: DeliveryLogFilter,
        page: PageRequest,
    ) -> Result<PaginatedResponse<DeliveryLog>, CoreError> {
        if filter.from.zip(filter.to).is_some_and(|(from, to)| from > to) {
            return Err(CoreError::BadRequest(
                "期間の開始は終了より前を指定してください".to_string(),
            ));
        }

        let (logs, total) = self
            .delivery_log_repo
            .list(&filter, page.limit(), page.offset())
            .await?;

        Ok(PaginatedResponse::new(logs, page, total))
    }

    /// ステータスごとの件数と成功率
    pub async fn stats(&self) -> Result<DeliveryStats, CoreError> {
        Ok(self.delivery_log_repo.stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;
    use recipebox_domain::{
        delivery_log::DeliveryStatus,
        notification::NotificationError,
        subscriber::SubscriberId,
    };
    use recipebox_infra::mock::MockDeliveryLogRepository;
    use rstest::{fixture, rstest};

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[fixture]
    async fn repo() -> MockDeliveryLogRepository {
        let repo = MockDeliveryLogRepository::new();
        let error = NotificationError::SendFailed("421 一時的なエラー".to_string());
        let logs = [
            DeliveryLog::sent(
                None,
                "a@example.com".to_string(),
                "件名1".to_string(),
                None,
                now(),
            ),
            DeliveryLog::sent(
                Some(SubscriberId::new()),
                "b@example.com".to_string(),
                "件名2".to_string(),
                None,
                now() + Duration::hours(1),
            ),
            DeliveryLog::failed(
                None,
                "c@example.org".to_string(),
                "件名3".to_string(),
                None,
                error.to_string(),
                now() + Duration::hours(2),
            ),
        ];
        for log in &logs {
            repo.insert(log).await.unwrap();
        }
        repo
    }

    fn sut(repo: &MockDeliveryLogRepository) -> DeliveryLogUseCaseImpl {
        DeliveryLogUseCaseImpl::new(Arc::new(repo.clone()))
    }

    #[rstest]
    #[tokio::test]
    async fn test_条件なしなら新しい順に全件返す(#[future] repo: MockDeliveryLogRepository) {
        let repo = repo.await;

        let page = sut(&repo)
            .list_logs(DeliveryLogFilter::default(), PageRequest::default())
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        let recipients: Vec<_> = page.data.iter().map(|l| l.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["c@example.org", "b@example.com", "a@example.com"]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_ステータスと宛先で絞り込める(#[future] repo: MockDeliveryLogRepository) {
        let repo = repo.await;
        let sut = sut(&repo);

        let failed = sut
            .list_logs(
                DeliveryLogFilter {
                    status: Some(DeliveryStatus::Failed),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        let example_com = sut
            .list_logs(
                DeliveryLogFilter {
                    recipient: Some("example.com".to_string()),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .unwrap();

        assert_eq!(failed.total, 1);
        assert_eq!(failed.data[0].error.as_deref(), Some("メール送信に失敗: 421 一時的なエラー"));
        assert_eq!(example_com.total, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_ページ指定で件数と総ページ数を返す(#[future] repo: MockDeliveryLogRepository) {
        let repo = repo.await;

        let page = sut(&repo)
            .list_logs(DeliveryLogFilter::default(), PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();

        assert_eq!(page.data.len(), 1);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_期間の開始が終了より後なら拒否する(#[future] repo: MockDeliveryLogRepository) {
        let repo = repo.await;

        let result = sut(&repo)
            .list_logs(
                DeliveryLogFilter {
                    from: Some(now()),
                    to: Some(now() - Duration::days(1)),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await;

        assert!(matches!(result, Err(CoreError::BadRequest(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_統計は成功率を含む(#[future] repo: MockDeliveryLogRepository) {
        let repo = repo.await;

        let stats = sut(&repo).stats().await.unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate, 66.67);
    }
}
