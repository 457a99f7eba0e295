//! # 送信設定の管理
//!
//! 送信用メールアカウント設定の参照・部分更新・接続テスト。
//!
//! ## 設計方針
//!
//! - **平文のパスワードは返さない**: 参照結果は [`MailSettingsView`] で `has_secret` のみを持つ
//! - **空のパスワードは「変更なし」**: 既存の暗号化済みパスワードを保持する
//! - **更新はプロバイダ経由**: 書き込み後にキャッシュを読み直し、次の送信から反映される

use std::sync::Arc;

use chrono::{DateTime, Utc};
use recipebox_domain::{mail_settings::MailSettings, notification::ConnectionTestResult};
use recipebox_infra::{MailSettingsProvider, SecretCodec, SecretError, TransportFactory};
use recipebox_shared::event_log::error;
use serde::Serialize;

use crate::error::CoreError;

/// パスワードを除いた送信設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailSettingsView {
    pub host:       String,
    pub port:       u16,
    pub secure:     bool,
    pub username:   String,
    pub has_secret: bool,
    pub from_name:  String,
    pub from_email: String,
    pub enabled:    bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&MailSettings> for MailSettingsView {
    fn from(settings: &MailSettings) -> Self {
        Self {
            host:       settings.host.clone(),
            port:       settings.port,
            secure:     settings.secure,
            username:   settings.username.clone(),
            has_secret: settings.has_secret(),
            from_name:  settings.from_name.clone(),
            from_email: settings.from_email.clone(),
            enabled:    settings.enabled,
            updated_at: settings.updated_at,
        }
    }
}

/// 送信設定の部分更新
///
/// 指定されたフィールドだけを変更する。
#[derive(Debug, Clone, Default)]
pub struct UpdateMailSettingsInput {
    pub host:       Option<String>,
    pub port:       Option<u16>,
    pub secure:     Option<bool>,
    pub username:   Option<String>,
    /// 平文のパスワード（空文字列または未指定なら既存の値を保持）
    pub password:   Option<String>,
    pub from_name:  Option<String>,
    pub from_email: Option<String>,
    pub enabled:    Option<bool>,
}

/// 送信設定の管理ユースケース
pub struct MailSettingsUseCaseImpl {
    provider:          Arc<MailSettingsProvider>,
    secret_codec:      SecretCodec,
    transport_factory: Arc<dyn TransportFactory>,
}

impl MailSettingsUseCaseImpl {
    pub fn new(
        provider: Arc<MailSettingsProvider>,
        secret_codec: SecretCodec,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            provider,
            secret_codec,
            transport_factory,
        }
    }

    /// 現在の送信設定を取得する
    pub async fn get_settings(&self) -> Result<MailSettingsView, CoreError> {
        let settings = self.provider.reload().await?;
        Ok(MailSettingsView::from(&settings))
    }

    /// 送信設定を部分更新する
    pub async fn update_settings(
        &self,
        input: UpdateMailSettingsInput,
    ) -> Result<MailSettingsView, CoreError> {
        let current = self.provider.reload().await?;

        if input.port == Some(0) {
            return Err(CoreError::BadRequest(
                "ポート番号は 1 以上を指定してください".to_string(),
            ));
        }
        if input
            .from_email
            .as_deref()
            .is_some_and(|from| !from.is_empty() && !from.contains('@'))
        {
            return Err(CoreError::BadRequest(
                "送信元メールアドレスの形式が不正です".to_string(),
            ));
        }

        let encrypted_password = match input.password.as_deref() {
            None | Some("") => current.encrypted_password.clone(),
            Some(password) => self.secret_codec.encrypt(password).map_err(|e| match e {
                SecretError::MissingPassphrase => {
                    tracing::error!(
                        error.category = error::category::CONFIGURATION,
                        error.kind = error::kind::SECRET,
                        "パスフレーズが未設定のためパスワードを保存できません"
                    );
                    CoreError::BadRequest(e.to_string())
                }
                other => CoreError::Internal(other.to_string()),
            })?,
        };

        let updated = MailSettings {
            host: input.host.unwrap_or(current.host),
            port: input.port.unwrap_or(current.port),
            secure: input.secure.unwrap_or(current.secure),
            username: input.username.unwrap_or(current.username),
            encrypted_password,
            from_name: input.from_name.unwrap_or(current.from_name),
            from_email: input.from_email.unwrap_or(current.from_email),
            enabled: input.enabled.unwrap_or(current.enabled),
            updated_at: current.updated_at,
        };

        let saved = self.provider.update(&updated).await?;
        tracing::info!(
            enabled = saved.enabled,
            host = %saved.host,
            has_secret = saved.has_secret(),
            "送信設定を更新しました"
        );

        Ok(MailSettingsView::from(&saved))
    }

    /// 保存済みの設定で SMTP サーバーへの接続を試す
    pub async fn test_connection(&self) -> Result<ConnectionTestResult, CoreError> {
        self.provider.reload().await?;
        Ok(self.transport_factory.test_connection().await)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use recipebox_domain::notification::ConnectionFailureKind;

    use super::*;
    use crate::test_utils::NewsletterTestBuilder;

    #[tokio::test]
    async fn test_取得結果にパスワードを含めない() {
        let setup = NewsletterTestBuilder::new().build().await;

        let view = setup.mail_settings.get_settings().await.unwrap();

        assert!(view.has_secret);
        assert!(view.enabled);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("password"));
    }

    #[tokio::test]
    async fn test_パスワードを指定すると暗号化して保存する() {
        let setup = NewsletterTestBuilder::new().without_mail_settings().build().await;

        let view = setup
            .mail_settings
            .update_settings(UpdateMailSettingsInput {
                host: Some("smtp.example.com".to_string()),
                username: Some("news@example.com".to_string()),
                password: Some("s3cret".to_string()),
                enabled: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(view.has_secret);
        let stored = setup.settings_provider.get();
        assert_ne!(stored.encrypted_password, "s3cret");
        assert_eq!(
            setup.secret_codec.decrypt(&stored.encrypted_password).unwrap(),
            "s3cret"
        );
        assert!(stored.is_deliverable());
    }

    #[rstest::rstest]
    #[case(None)]
    #[case(Some(String::new()))]
    #[tokio::test]
    async fn test_パスワードが空なら既存の値を保持する(#[case] password: Option<String>) {
        let setup = NewsletterTestBuilder::new().build().await;
        let before = setup.settings_provider.get().encrypted_password;

        setup
            .mail_settings
            .update_settings(UpdateMailSettingsInput {
                from_name: Some("Recipebox 編集部".to_string()),
                password,
                ..Default::default()
            })
            .await
            .unwrap();

        let after = setup.settings_provider.get();
        assert_eq!(after.encrypted_password, before);
        assert_eq!(after.from_name, "Recipebox 編集部");
        assert_eq!(after.host, "smtp.example.com");
    }

    #[tokio::test]
    async fn test_パスフレーズが無ければパスワードの保存を拒否する() {
        let setup = NewsletterTestBuilder::new()
            .with_secret_passphrase(None)
            .build()
            .await;

        let result = setup
            .mail_settings
            .update_settings(UpdateMailSettingsInput {
                password: Some("s3cret".to_string()),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(CoreError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_不正なポートと送信元アドレスを拒否する() {
        let setup = NewsletterTestBuilder::new().build().await;

        let port = setup
            .mail_settings
            .update_settings(UpdateMailSettingsInput {
                port: Some(0),
                ..Default::default()
            })
            .await;
        let from = setup
            .mail_settings
            .update_settings(UpdateMailSettingsInput {
                from_email: Some("no-at-mark".to_string()),
                ..Default::default()
            })
            .await;

        assert!(matches!(port, Err(CoreError::BadRequest(_))));
        assert!(matches!(from, Err(CoreError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_接続テストの結果をそのまま返す() {
        let setup = NewsletterTestBuilder::new().build().await;
        setup
            .transport_factory
            .set_connection_test_result(ConnectionTestResult::failed(
                ConnectionFailureKind::Authentication,
                "535 認証に失敗しました",
            ));

        let result = setup.mail_settings.test_connection().await.unwrap();

        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(ConnectionFailureKind::Authentication));
    }
}
