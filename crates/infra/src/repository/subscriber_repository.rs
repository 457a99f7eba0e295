//! # SubscriberRepository
//!
//! ニュースレター購読者の永続化を担当するリポジトリ。
//!
//! メールアドレスの一意性は `subscribers.email` の UNIQUE 制約（完全一致）に任せる。
//! 大文字小文字の正規化は行わない。

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recipebox_domain::subscriber::{Subscriber, SubscriberEmail, SubscriberId, SubscriberStatus};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 状態ごとの購読者数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberCounts {
    pub total:        u64,
    pub pending:      u64,
    pub active:       u64,
    pub unsubscribed: u64,
    pub verified:     u64,
}

/// 購読者リポジトリトレイト
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn find_by_id(&self, id: &SubscriberId) -> Result<Option<Subscriber>, InfraError>;

    /// メールアドレスの完全一致で検索する
    async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, InfraError>;

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, InfraError>;

    async fn find_by_unsubscribe_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, InfraError>;

    /// 新規購読者を挿入する
    ///
    /// 同じメールアドレスが既に存在する場合は `InfraErrorKind::Conflict`。
    async fn insert(&self, subscriber: &Subscriber) -> Result<(), InfraError>;

    /// 状態・トークン・日時を更新する
    async fn update(&self, subscriber: &Subscriber) -> Result<(), InfraError>;

    /// 保存済みの行がまだ未検証の場合だけ更新する
    ///
    /// 同じ確認リンクへの同時リクエストのうち、書き込めるのは 1 件だけ。
    /// 既に検証済みだった場合は何もせず false を返す。
    async fn update_if_unverified(&self, subscriber: &Subscriber) -> Result<bool, InfraError>;

    /// 保存済みの行がまだ解除されていない場合だけ更新する
    ///
    /// 既に解除済みだった場合は何もせず false を返す。
    async fn update_if_subscribed(&self, subscriber: &Subscriber) -> Result<bool, InfraError>;

    /// 削除する。存在しなかった場合は false
    async fn delete(&self, id: &SubscriberId) -> Result<bool, InfraError>;

    /// キャンペーン配信対象（`active` かつ検証済み）を登録順に取得する
    async fn find_campaign_recipients(&self) -> Result<Vec<Subscriber>, InfraError>;

    /// `subscribed_date` が `cutoff` より前の未検証購読者を削除し、件数を返す
    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> Result<u64, InfraError>;

    /// 状態ごとの件数を集計する
    async fn count_by_status(&self) -> Result<SubscriberCounts, InfraError>;

    /// 一覧を新しい順に取得する（総件数付き）
    async fn list(
        &self,
        status: Option<SubscriberStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Subscriber>, u64), InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriberRow {
    id: Uuid,
    email: String,
    status: String,
    verified: bool,
    verified_at: Option<DateTime<Utc>>,
    verification_token: Option<String>,
    unsubscribe_token: Option<String>,
    subscribed_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = InfraError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        Ok(Subscriber::from_db(
            SubscriberId::from_uuid(row.id),
            SubscriberEmail::new(row.email)
                .map_err(|e| InfraError::invalid_data(e.to_string()))?,
            SubscriberStatus::from_str(&row.status)
                .map_err(|_| InfraError::invalid_data(format!("不正な購読状態: {}", row.status)))?,
            row.verified,
            row.verified_at,
            row.verification_token,
            row.unsubscribe_token,
            row.subscribed_date,
            row.created_at,
            row.updated_at,
        ))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, email, status, verified, verified_at,
           verification_token, unsubscribe_token,
           subscribed_date, created_at, updated_at
    FROM subscribers
"#;

/// PostgreSQL 実装の SubscriberRepository
#[derive(Debug, Clone)]
pub struct PostgresSubscriberRepository {
    pool: PgPool,
}

impl PostgresSubscriberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        condition: &str,
        value: String,
    ) -> Result<Option<Subscriber>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} WHERE {condition} = $1");
        sqlx::query_as::<_, SubscriberRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(Subscriber::try_from)
            .transpose()
    }

    /// `id` に加えて `guard` を満たす行だけを更新し、更新件数を返す
    async fn update_guarded(&self, subscriber: &Subscriber, guard: &str) -> Result<u64, InfraError> {
        let sql = format!(
            r#"
            UPDATE subscribers
            SET status = $2,
                verified = $3,
                verified_at = $4,
                verification_token = $5,
                unsubscribe_token = $6,
                subscribed_date = $7,
                updated_at = $8
            WHERE id = $1 {guard}
            "#
        );
        let result = sqlx::query(&sql)
            .bind(subscriber.id().as_uuid())
            .bind(subscriber.status().to_string())
            .bind(subscriber.verified())
            .bind(subscriber.verified_at())
            .bind(subscriber.verification_token())
            .bind(subscriber.unsubscribe_token())
            .bind(subscriber.subscribed_date())
            .bind(subscriber.updated_at())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SubscriberRepository for PostgresSubscriberRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &SubscriberId) -> Result<Option<Subscriber>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        sqlx::query_as::<_, SubscriberRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Subscriber::try_from)
            .transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, InfraError> {
        self.find_one("email", email.as_str().to_string()).await
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, InfraError> {
        self.find_one("verification_token", token.to_string()).await
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_by_unsubscribe_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, InfraError> {
        self.find_one("unsubscribe_token", token.to_string()).await
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %subscriber.id()))]
    async fn insert(&self, subscriber: &Subscriber) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (
                id, email, status, verified, verified_at,
                verification_token, unsubscribe_token,
                subscribed_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(subscriber.id().as_uuid())
        .bind(subscriber.email().as_str())
        .bind(subscriber.status().to_string())
        .bind(subscriber.verified())
        .bind(subscriber.verified_at())
        .bind(subscriber.verification_token())
        .bind(subscriber.unsubscribe_token())
        .bind(subscriber.subscribed_date())
        .bind(subscriber.created_at())
        .bind(subscriber.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| InfraError::from_unique_violation(e, "Subscriber", subscriber.email().as_str()))?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %subscriber.id()))]
    async fn update(&self, subscriber: &Subscriber) -> Result<(), InfraError> {
        self.update_guarded(subscriber, "").await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %subscriber.id()))]
    async fn update_if_unverified(&self, subscriber: &Subscriber) -> Result<bool, InfraError> {
        let updated = self
            .update_guarded(subscriber, "AND verified = FALSE")
            .await?;
        Ok(updated > 0)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %subscriber.id()))]
    async fn update_if_subscribed(&self, subscriber: &Subscriber) -> Result<bool, InfraError> {
        let updated = self
            .update_guarded(subscriber, "AND status <> 'unsubscribed'")
            .await?;
        Ok(updated > 0)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn delete(&self, id: &SubscriberId) -> Result<bool, InfraError> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_campaign_recipients(&self) -> Result<Vec<Subscriber>, InfraError> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE status = 'active' AND verified = TRUE ORDER BY created_at"
        );
        sqlx::query_as::<_, SubscriberRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Subscriber::try_from)
            .collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%cutoff))]
    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> Result<u64, InfraError> {
        let result =
            sqlx::query("DELETE FROM subscribers WHERE verified = FALSE AND subscribed_date < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn count_by_status(&self) -> Result<SubscriberCounts, InfraError> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*), COUNT(*) FILTER (WHERE verified)
            FROM subscribers
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = SubscriberCounts::default();
        for (status, count, verified) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            let status = SubscriberStatus::from_str(&status)
                .map_err(|_| InfraError::invalid_data(format!("不正な購読状態: {status}")))?;
            match status {
                SubscriberStatus::Pending => counts.pending = count,
                SubscriberStatus::Active => counts.active = count,
                SubscriberStatus::Unsubscribed => counts.unsubscribed = count,
            }
            counts.total += count;
            counts.verified += u64::try_from(verified).unwrap_or_default();
        }

        Ok(counts)
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn list(
        &self,
        status: Option<SubscriberStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Subscriber>, u64), InfraError> {
        let status = status.map(|s| s.to_string());

        let sql = format!(
            "{SELECT_COLUMNS} WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let subscribers = sqlx::query_as::<_, SubscriberRow>(&sql)
            .bind(status.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Subscriber::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscribers WHERE ($1::TEXT IS NULL OR status = $1)")
                .bind(status.as_deref())
                .fetch_one(&self.pool)
                .await?;

        Ok((subscribers, u64::try_from(total).unwrap_or_default()))
    }
}
