//! # MailSettingsRepository
//!
//! 送信用メールアカウント設定（シングルトン行）の永続化を担当するリポジトリ。
//! 行の主キーは常に 1 で、書き込みは UPSERT の後勝ち。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recipebox_domain::mail_settings::MailSettings;
use sqlx::PgPool;

use crate::error::InfraError;

const SINGLETON_ID: i32 = 1;

/// 送信設定リポジトリトレイト
#[async_trait]
pub trait MailSettingsRepository: Send + Sync {
    /// 設定を取得する。未登録なら None
    async fn get(&self) -> Result<Option<MailSettings>, InfraError>;

    /// 設定を保存する（存在しなければ作成）
    async fn upsert(&self, settings: &MailSettings) -> Result<(), InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct MailSettingsRow {
    host: String,
    port: i32,
    secure: bool,
    username: String,
    encrypted_password: String,
    from_name: String,
    from_email: String,
    enabled: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MailSettingsRow> for MailSettings {
    type Error = InfraError;

    fn try_from(row: MailSettingsRow) -> Result<Self, Self::Error> {
        Ok(MailSettings {
            host:               row.host,
            port:               u16::try_from(row.port)
                .map_err(|_| InfraError::invalid_data(format!("不正なポート番号: {}", row.port)))?,
            secure:             row.secure,
            username:           row.username,
            encrypted_password: row.encrypted_password,
            from_name:          row.from_name,
            from_email:         row.from_email,
            enabled:            row.enabled,
            updated_at:         Some(row.updated_at),
        })
    }
}

/// PostgreSQL 実装の MailSettingsRepository
#[derive(Debug, Clone)]
pub struct PostgresMailSettingsRepository {
    pool: PgPool,
}

impl PostgresMailSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MailSettingsRepository for PostgresMailSettingsRepository {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn get(&self) -> Result<Option<MailSettings>, InfraError> {
        sqlx::query_as::<_, MailSettingsRow>(
            r#"
            SELECT host, port, secure, username, encrypted_password,
                   from_name, from_email, enabled, updated_at
            FROM mail_settings
            WHERE id = $1
            "#,
        )
        .bind(SINGLETON_ID)
        .fetch_optional(&self.pool)
        .await?
        .map(MailSettings::try_from)
        .transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn upsert(&self, settings: &MailSettings) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO mail_settings (
                id, host, port, secure, username, encrypted_password,
                from_name, from_email, enabled, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (id) DO UPDATE
            SET host = EXCLUDED.host,
                port = EXCLUDED.port,
                secure = EXCLUDED.secure,
                username = EXCLUDED.username,
                encrypted_password = EXCLUDED.encrypted_password,
                from_name = EXCLUDED.from_name,
                from_email = EXCLUDED.from_email,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            "#,
        )
        .bind(SINGLETON_ID)
        .bind(&settings.host)
        .bind(i32::from(settings.port))
        .bind(settings.secure)
        .bind(&settings.username)
        .bind(&settings.encrypted_password)
        .bind(&settings.from_name)
        .bind(&settings.from_email)
        .bind(settings.enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresMailSettingsRepository>();
    }

    #[test]
    fn test_範囲外のポート番号は変換に失敗する() {
        let row = MailSettingsRow {
            host: "smtp.example.com".to_string(),
            port: 70000,
            secure: false,
            username: String::new(),
            encrypted_password: String::new(),
            from_name: String::new(),
            from_email: String::new(),
            enabled: false,
            updated_at: Utc::now(),
        };

        assert!(MailSettings::try_from(row).is_err());
    }
}
