//! # Newsletter Service 設定
//!
//! 環境変数からサーバー設定を読み込み、送信・配信ポリシーの既定値を提供する。
//!
//! 送信用メールアカウントの設定（ホスト・認証情報など）は環境変数ではなく
//! DB のシングルトン行で管理する（[`recipebox_infra::MailSettingsProvider`]）。

use std::{env, time::Duration};

use thiserror::Error;

/// 設定読み込みのエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} が設定されていません（.env を確認してください）")]
    Missing(&'static str),

    #[error("{name} の値が不正です: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Newsletter Service サーバーの設定
#[derive(Debug, Clone)]
pub struct NewsletterConfig {
    /// バインドアドレス
    pub host: String,
    /// ポート番号
    pub port: u16,
    /// データベース接続 URL
    pub database_url: String,
    /// パスワード暗号化のパスフレーズ（未設定の場合は暗号化・復号ともに失敗する）
    pub mail_secret_passphrase: Option<String>,
    /// サイト情報（メール内リンク用）
    pub site: SiteConfig,
}

/// メール本文に埋め込むサイト情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    /// 絶対 URL のベース（末尾スラッシュなし）
    pub base_url: String,
    /// サイト名
    pub name:     String,
}

impl SiteConfig {
    pub fn new(base_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            name:     name.into(),
        }
    }

    /// サイト内パスを絶対 URL にする
    ///
    /// 既に `http://` / `https://` で始まる場合はそのまま返す。
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl NewsletterConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("NEWSLETTER_PORT").map_err(|_| ConfigError::Missing("NEWSLETTER_PORT"))?;
        let port = port.parse().map_err(|_| ConfigError::Invalid {
            name:  "NEWSLETTER_PORT",
            value: port,
        })?;

        Ok(Self {
            host: env::var("NEWSLETTER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            mail_secret_passphrase: env::var("MAIL_SECRET_PASSPHRASE")
                .ok()
                .filter(|p| !p.is_empty()),
            site: SiteConfig::new(
                env::var("SITE_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
                env::var("SITE_NAME").unwrap_or_else(|_| "Recipebox".to_string()),
            ),
        })
    }
}

/// 送信失敗時の再試行ポリシー
///
/// 待機時間は `base_delay × 試行回数` の線形バックオフ（既定で 2 秒, 4 秒, 6 秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 初回送信に加えて行う再試行の最大回数
    pub max_retries: u32,
    pub base_delay:  Duration,
}

impl RetryPolicy {
    /// `failed_attempts` 回失敗した後の待機時間
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        self.base_delay * failed_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay:  Duration::from_secs(2),
        }
    }
}

/// キャンペーン配信のバッチ設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignPolicy {
    /// 1 バッチあたりの購読者数（バッチ内は並行送信）
    pub batch_size:  usize,
    /// バッチ間の待機時間
    pub batch_pause: Duration,
}

impl Default for CampaignPolicy {
    fn default() -> Self {
        Self {
            batch_size:  50,
            batch_pause: Duration::from_secs(2),
        }
    }
}

/// 確認メールなどのトランザクションメールの送り方
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// 別タスクで送信し、リクエストの応答を待たせない
    #[default]
    Background,
    /// 送信完了まで待つ（テスト用）
    Inline,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_再試行の待機時間は試行回数に比例する() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(6));
    }

    #[test]
    fn test_キャンペーンの既定値は50件ずつ2秒間隔() {
        let policy = CampaignPolicy::default();

        assert_eq!(policy.batch_size, 50);
        assert_eq!(policy.batch_pause, Duration::from_secs(2));
    }

    #[test]
    fn test_サイトurlの末尾スラッシュは取り除かれる() {
        let site = SiteConfig::new("https://recipes.example.com/", "Recipebox");

        assert_eq!(site.base_url, "https://recipes.example.com");
    }

    #[rstest]
    #[case("/uploads/curry.jpg", "https://recipes.example.com/uploads/curry.jpg")]
    #[case("uploads/curry.jpg", "https://recipes.example.com/uploads/curry.jpg")]
    #[case("https://cdn.example.com/curry.jpg", "https://cdn.example.com/curry.jpg")]
    #[case("http://cdn.example.com/curry.jpg", "http://cdn.example.com/curry.jpg")]
    fn test_absolute_urlは相対パスだけを補完する(#[case] path: &str, #[case] expected: &str) {
        let site = SiteConfig::new("https://recipes.example.com", "Recipebox");

        assert_eq!(site.absolute_url(path), expected);
    }
}
