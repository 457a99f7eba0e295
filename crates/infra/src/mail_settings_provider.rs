//! # 送信設定プロバイダ
//!
//! 送信用メールアカウント設定（シングルトン行）をキャッシュし、
//! `get()` / `reload()` / `update()` の明示的な契約で提供する。
//!
//! - `get()` はキャッシュ済みの設定を返す（DB にアクセスしない）
//! - `reload()` は DB から読み直してキャッシュを置き換える
//! - `update()` は DB に書き込んだ後に読み直す
//!
//! キャンペーン配信は開始時に `reload()` するため、設定変更は遅くとも
//! 次のキャンペーンから反映される。

use std::sync::{Arc, RwLock};

use recipebox_domain::mail_settings::MailSettings;

use crate::{error::InfraError, repository::MailSettingsRepository};

/// 送信設定プロバイダ
pub struct MailSettingsProvider {
    repository: Arc<dyn MailSettingsRepository>,
    cache:      RwLock<MailSettings>,
}

impl MailSettingsProvider {
    /// 未読み込み（既定値 = 無効）の状態で作成する
    pub fn new(repository: Arc<dyn MailSettingsRepository>) -> Self {
        Self {
            repository,
            cache: RwLock::new(MailSettings::default()),
        }
    }

    /// 作成して DB から読み込む
    pub async fn load(repository: Arc<dyn MailSettingsRepository>) -> Result<Self, InfraError> {
        let provider = Self::new(repository);
        provider.reload().await?;
        Ok(provider)
    }

    /// キャッシュ済みの設定を返す
    pub fn get(&self) -> MailSettings {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// DB から読み直してキャッシュを更新する
    ///
    /// 行が存在しない場合は既定値（無効）になる。
    pub async fn reload(&self) -> Result<MailSettings, InfraError> {
        let settings = self.repository.get().await?.unwrap_or_default();
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = settings.clone();
        tracing::debug!(
            enabled = settings.enabled,
            host = %settings.host,
            has_secret = settings.has_secret(),
            "送信設定を読み込みました"
        );
        Ok(settings)
    }

    /// 設定を保存し、保存後の内容でキャッシュを更新する
    pub async fn update(&self, settings: &MailSettings) -> Result<MailSettings, InfraError> {
        self.repository.upsert(settings).await?;
        self.reload().await
    }
}
