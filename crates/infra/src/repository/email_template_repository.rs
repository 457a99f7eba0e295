//! # EmailTemplateRepository
//!
//! メールテンプレートの永続化を担当するリポジトリ。
//!
//! 既定テンプレートの一意性は `(kind) WHERE is_default` の部分 UNIQUE インデックスで
//! 保証し、[`EmailTemplateRepository::set_default`] は同じトランザクション内で
//! 兄弟テンプレートの既定フラグを外してから対象に立てる。

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recipebox_domain::email_template::{EmailTemplate, EmailTemplateId, TemplateKind};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// メールテンプレートリポジトリトレイト
#[async_trait]
pub trait EmailTemplateRepository: Send + Sync {
    async fn find_by_id(&self, id: &EmailTemplateId)
    -> Result<Option<EmailTemplate>, InfraError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<EmailTemplate>, InfraError>;

    /// 指定種別のテンプレートを既定のものから順に取得する
    async fn find_by_kind(&self, kind: TemplateKind) -> Result<Vec<EmailTemplate>, InfraError>;

    /// 全テンプレートを種別・名前順に取得する
    async fn find_all(&self) -> Result<Vec<EmailTemplate>, InfraError>;

    /// 挿入する。同名のテンプレートがあれば `InfraErrorKind::Conflict`
    async fn insert(&self, template: &EmailTemplate) -> Result<(), InfraError>;

    /// 名前・件名・本文・宣言変数を更新する（既定フラグは [`Self::set_default`] で変更する）
    async fn update(&self, template: &EmailTemplate) -> Result<(), InfraError>;

    /// 削除する。存在しなかった場合は false
    async fn delete(&self, id: &EmailTemplateId) -> Result<bool, InfraError>;

    /// 同じ種別の他のテンプレートの既定フラグを外し、対象を既定にする
    ///
    /// 対象が存在しない、または種別が異なる場合は false を返し、何も変更しない。
    async fn set_default(
        &self,
        kind: TemplateKind,
        id: &EmailTemplateId,
    ) -> Result<bool, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct EmailTemplateRow {
    id: Uuid,
    name: String,
    kind: String,
    subject: String,
    body_html: String,
    body_text: String,
    variables: Vec<String>,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EmailTemplateRow> for EmailTemplate {
    type Error = InfraError;

    fn try_from(row: EmailTemplateRow) -> Result<Self, Self::Error> {
        Ok(EmailTemplate::from_db(
            EmailTemplateId::from_uuid(row.id),
            row.name,
            TemplateKind::from_str(&row.kind).map_err(|_| {
                InfraError::invalid_data(format!("不正なテンプレート種別: {}", row.kind))
            })?,
            row.subject,
            row.body_html,
            row.body_text,
            row.variables,
            row.is_default,
            row.created_at,
            row.updated_at,
        ))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, kind, subject, body_html, body_text,
           variables, is_default, created_at, updated_at
    FROM email_templates
"#;

/// PostgreSQL 実装の EmailTemplateRepository
#[derive(Debug, Clone)]
pub struct PostgresEmailTemplateRepository {
    pool: PgPool,
}

impl PostgresEmailTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailTemplateRepository for PostgresEmailTemplateRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(
        &self,
        id: &EmailTemplateId,
    ) -> Result<Option<EmailTemplate>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        sqlx::query_as::<_, EmailTemplateRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(EmailTemplate::try_from)
            .transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%name))]
    async fn find_by_name(&self, name: &str) -> Result<Option<EmailTemplate>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} WHERE name = $1");
        sqlx::query_as::<_, EmailTemplateRow>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(EmailTemplate::try_from)
            .transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%kind))]
    async fn find_by_kind(&self, kind: TemplateKind) -> Result<Vec<EmailTemplate>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} WHERE kind = $1 ORDER BY is_default DESC, created_at");
        sqlx::query_as::<_, EmailTemplateRow>(&sql)
            .bind(kind.to_string())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(EmailTemplate::try_from)
            .collect()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_all(&self) -> Result<Vec<EmailTemplate>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY kind, name");
        sqlx::query_as::<_, EmailTemplateRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(EmailTemplate::try_from)
            .collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %template.id()))]
    async fn insert(&self, template: &EmailTemplate) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO email_templates (
                id, name, kind, subject, body_html, body_text,
                variables, is_default, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(template.id().as_uuid())
        .bind(template.name())
        .bind(template.kind().to_string())
        .bind(template.subject())
        .bind(template.body_html())
        .bind(template.body_text())
        .bind(template.variables())
        .bind(template.is_default())
        .bind(template.created_at())
        .bind(template.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| InfraError::from_unique_violation(e, "EmailTemplate", template.name()))?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %template.id()))]
    async fn update(&self, template: &EmailTemplate) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            UPDATE email_templates
            SET name = $2,
                subject = $3,
                body_html = $4,
                body_text = $5,
                variables = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(template.id().as_uuid())
        .bind(template.name())
        .bind(template.subject())
        .bind(template.body_html())
        .bind(template.body_text())
        .bind(template.variables())
        .bind(template.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| InfraError::from_unique_violation(e, "EmailTemplate", template.name()))?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn delete(&self, id: &EmailTemplateId) -> Result<bool, InfraError> {
        let result = sqlx::query("DELETE FROM email_templates WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%kind, %id))]
    async fn set_default(
        &self,
        kind: TemplateKind,
        id: &EmailTemplateId,
    ) -> Result<bool, InfraError> {
        let mut tx = self.pool.begin().await?;

        let target: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM email_templates WHERE id = $1 AND kind = $2 FOR UPDATE")
                .bind(id.as_uuid())
                .bind(kind.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        if target.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE email_templates
            SET is_default = FALSE, updated_at = NOW()
            WHERE kind = $1 AND id <> $2 AND is_default
            "#,
        )
        .bind(kind.to_string())
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE email_templates SET is_default = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresEmailTemplateRepository>();
    }
}
