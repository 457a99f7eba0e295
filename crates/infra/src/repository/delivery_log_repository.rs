//! # DeliveryLogRepository
//!
//! 配信ログの永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **追記専用**: 更新・削除のメソッドは持たない
//! - **最終結果のみ**: リトライ途中の試行は記録せず、呼び出し側が最終結果を 1 行で渡す
//! - **動的な検索条件**: フィルタは `QueryBuilder` で組み立てる

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recipebox_domain::{
    delivery_log::{DeliveryLog, DeliveryLogFilter, DeliveryLogId, DeliveryStats, DeliveryStatus},
    email_template::EmailTemplateId,
    subscriber::SubscriberId,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::InfraError;

/// 配信ログリポジトリトレイト
#[async_trait]
pub trait DeliveryLogRepository: Send + Sync {
    /// 配信ログを挿入する
    async fn insert(&self, log: &DeliveryLog) -> Result<(), InfraError>;

    /// 条件に一致するログを新しい順に取得する（総件数付き）
    async fn list(
        &self,
        filter: &DeliveryLogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DeliveryLog>, u64), InfraError>;

    /// ステータスごとの件数から統計を返す
    async fn stats(&self) -> Result<DeliveryStats, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryLogRow {
    id: Uuid,
    subscriber_id: Option<Uuid>,
    recipient: String,
    subject: String,
    template_id: Option<Uuid>,
    status: String,
    error: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeliveryLogRow> for DeliveryLog {
    type Error = InfraError;

    fn try_from(row: DeliveryLogRow) -> Result<Self, Self::Error> {
        Ok(DeliveryLog {
            id:            DeliveryLogId::from_uuid(row.id),
            subscriber_id: row.subscriber_id.map(SubscriberId::from_uuid),
            recipient:     row.recipient,
            subject:       row.subject,
            template_id:   row.template_id.map(EmailTemplateId::from_uuid),
            status:        DeliveryStatus::from_str(&row.status).map_err(|_| {
                InfraError::invalid_data(format!("不正な配信ステータス: {}", row.status))
            })?,
            error:         row.error,
            sent_at:       row.sent_at,
            created_at:    row.created_at,
        })
    }
}

/// フィルタ条件を WHERE 句として追加する
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &DeliveryLogFilter) {
    builder.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.to_string());
    }
    if let Some(recipient) = &filter.recipient {
        builder
            .push(" AND recipient ILIKE ")
            .push_bind(format!("%{}%", escape_like(recipient)));
    }
    if let Some(template_id) = &filter.template_id {
        builder
            .push(" AND template_id = ")
            .push_bind(*template_id.as_uuid());
    }
    if let Some(from) = filter.from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
}

/// LIKE のワイルドカード文字をエスケープする
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// PostgreSQL 実装の DeliveryLogRepository
#[derive(Debug, Clone)]
pub struct PostgresDeliveryLogRepository {
    pool: PgPool,
}

impl PostgresDeliveryLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLogRepository for PostgresDeliveryLogRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %log.id, status = %log.status))]
    async fn insert(&self, log: &DeliveryLog) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_logs (
                id, subscriber_id, recipient, subject, template_id,
                status, error, sent_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(log.id.as_uuid())
        .bind(log.subscriber_id.as_ref().map(|id| *id.as_uuid()))
        .bind(&log.recipient)
        .bind(&log.subject)
        .bind(log.template_id.as_ref().map(|id| *id.as_uuid()))
        .bind(log.status.to_string())
        .bind(log.error.as_deref())
        .bind(log.sent_at)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn list(
        &self,
        filter: &DeliveryLogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DeliveryLog>, u64), InfraError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, subscriber_id, recipient, subject, template_id, \
             status, error, sent_at, created_at FROM delivery_logs",
        );
        push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let logs = builder
            .build_query_as::<DeliveryLogRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DeliveryLog::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM delivery_logs");
        push_filter(&mut count_builder, filter);
        let (total,): (i64,) = count_builder
            .build_query_as()
            .fetch_one(&self.pool)
            .await?;

        Ok((logs, u64::try_from(total).unwrap_or_default()))
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn stats(&self) -> Result<DeliveryStats, InfraError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM delivery_logs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let (mut sent, mut failed, mut pending) = (0, 0, 0);
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            match DeliveryStatus::from_str(&status) {
                Ok(DeliveryStatus::Sent) => sent = count,
                Ok(DeliveryStatus::Failed) => failed = count,
                Ok(DeliveryStatus::Pending) => pending = count,
                Err(_) => {
                    return Err(InfraError::invalid_data(format!(
                        "不正な配信ステータス: {status}"
                    )));
                }
            }
        }

        Ok(DeliveryStats::from_counts(sent, failed, pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresDeliveryLogRepository>();
    }

    #[test]
    fn test_likeのワイルドカードをエスケープする() {
        assert_eq!(escape_like("a_b%c\\d"), "a\\_b\\%c\\\\d");
    }

    #[test]
    fn test_フィルタなしではwhere_trueのみ() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM delivery_logs");

        push_filter(&mut builder, &DeliveryLogFilter::default());

        assert_eq!(builder.sql(), "SELECT COUNT(*) FROM delivery_logs WHERE TRUE");
    }

    #[test]
    fn test_フィルタ条件ごとにプレースホルダが追加される() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM delivery_logs");
        let filter = DeliveryLogFilter {
            status: Some(DeliveryStatus::Failed),
            recipient: Some("alice".to_string()),
            ..Default::default()
        };

        push_filter(&mut builder, &filter);

        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM delivery_logs WHERE TRUE AND status = $1 AND recipient ILIKE $2"
        );
    }
}
