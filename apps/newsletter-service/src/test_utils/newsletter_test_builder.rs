//! ニュースレターテストビルダー
//!
//! 全ユースケースをモックリポジトリ・モックトランスポートで組み立てる。
//! 送信はインラインで行い、再試行とバッチ間の待機は 0 にする。

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use recipebox_domain::{
    clock::FixedClock,
    mail_settings::MailSettings,
    subscriber::{Subscriber, SubscriberEmail, SubscriberId, VerificationOutcome},
};
use recipebox_infra::{
    MailSettingsProvider,
    SecretCodec,
    mock::{
        MockDeliveryLogRepository,
        MockEmailTemplateRepository,
        MockMailSettingsRepository,
        MockMailTransport,
        MockSubscriberRepository,
        MockTransportFactory,
    },
    token::generate_token,
};

use crate::{
    config::{CampaignPolicy, DeliveryMode, RetryPolicy, SiteConfig},
    usecase::{
        CampaignDispatcher,
        DeliveryLogUseCaseImpl,
        MailSender,
        MailSettingsUseCaseImpl,
        SubscriberAdminUseCaseImpl,
        SubscriptionUseCaseImpl,
        TemplateRenderer,
        TemplateStore,
    },
};

const TEST_PASSPHRASE: &str = "test-passphrase";

/// ニュースレターテストのセットアップデータ
///
/// NewsletterTestBuilder が生成する SUT 群と Mock への参照のセット。
pub struct NewsletterTestSetup {
    pub builder:           NewsletterTestBuilder,
    pub clock:             Arc<FixedClock>,
    pub site:              SiteConfig,
    pub secret_codec:      SecretCodec,
    pub subscriber_repo:   MockSubscriberRepository,
    pub template_repo:     MockEmailTemplateRepository,
    pub settings_repo:     MockMailSettingsRepository,
    pub delivery_log_repo: MockDeliveryLogRepository,
    pub transport:         MockMailTransport,
    pub transport_factory: MockTransportFactory,
    pub settings_provider: Arc<MailSettingsProvider>,
    pub template_store:    Arc<TemplateStore>,
    pub mail_sender:       Arc<MailSender>,
    pub subscription:      Arc<SubscriptionUseCaseImpl>,
    pub campaign:          Arc<CampaignDispatcher>,
    pub mail_settings:     Arc<MailSettingsUseCaseImpl>,
    pub delivery_logs:     Arc<DeliveryLogUseCaseImpl>,
    pub subscribers:       Arc<SubscriberAdminUseCaseImpl>,
}

/// ニュースレターテストビルダー
///
/// # 使用例
///
/// ```ignore
/// use recipebox_newsletter_service::test_utils::NewsletterTestBuilder;
///
/// #[tokio::test]
/// async fn test_example() {
///     let setup = NewsletterTestBuilder::new().build().await;
///     setup.subscriber_repo.add(setup.builder.active_subscriber("a@example.com"));
///
///     let summary = setup.campaign.run(recipe).await.unwrap();
/// }
/// ```
#[derive(Clone)]
pub struct NewsletterTestBuilder {
    now:               DateTime<Utc>,
    site:              SiteConfig,
    retry_policy:      RetryPolicy,
    campaign_policy:   CampaignPolicy,
    secret_passphrase: Option<String>,
    mail_enabled:      bool,
    seed_templates:    bool,
}

impl NewsletterTestBuilder {
    /// デフォルト値で新しいビルダーを作成
    pub fn new() -> Self {
        Self {
            now:               DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            site:              SiteConfig::new("https://recipes.example.com", "Recipebox"),
            retry_policy:      RetryPolicy {
                base_delay: Duration::ZERO,
                ..RetryPolicy::default()
            },
            campaign_policy:   CampaignPolicy {
                batch_pause: Duration::ZERO,
                ..CampaignPolicy::default()
            },
            secret_passphrase: Some(TEST_PASSPHRASE.to_string()),
            mail_enabled:      true,
            seed_templates:    true,
        }
    }

    /// 現在時刻を指定
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// 再試行ポリシーを指定
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// キャンペーンのバッチ設定を指定
    pub fn with_campaign_policy(mut self, policy: CampaignPolicy) -> Self {
        self.campaign_policy = policy;
        self
    }

    /// シークレットのパスフレーズを指定（`None` で未設定）
    pub fn with_secret_passphrase(mut self, passphrase: Option<&str>) -> Self {
        self.secret_passphrase = passphrase.map(str::to_string);
        self
    }

    /// 送信設定を保存しない状態で構築する
    pub fn without_mail_settings(mut self) -> Self {
        self.mail_enabled = false;
        self
    }

    /// 組み込みテンプレートを投入しない状態で構築する
    pub fn without_templates(mut self) -> Self {
        self.seed_templates = false;
        self
    }

    /// ビルダーの now を取得
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// シークレットコーデック（ビルダーのパスフレーズ）
    pub fn secret_codec(&self) -> SecretCodec {
        SecretCodec::new(self.secret_passphrase.clone())
    }

    /// 送信可能な送信設定（パスワードはテスト用パスフレーズで暗号化済み）
    pub fn deliverable_settings(&self) -> MailSettings {
        MailSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            secure: false,
            username: "news@example.com".to_string(),
            encrypted_password: SecretCodec::new(Some(TEST_PASSPHRASE.to_string()))
                .encrypt("smtp-password")
                .unwrap(),
            from_name: "Recipebox".to_string(),
            from_email: "news@example.com".to_string(),
            enabled: true,
            updated_at: Some(self.now),
        }
    }

    /// 検証待ち（Pending）の購読者を作成
    pub fn pending_subscriber(&self, email: &str) -> Subscriber {
        Subscriber::new(
            SubscriberId::new(),
            SubscriberEmail::new(email).unwrap(),
            generate_token(),
            generate_token(),
            self.now,
        )
    }

    /// 検証済みで配信対象（Active）の購読者を作成
    pub fn active_subscriber(&self, email: &str) -> Subscriber {
        match self.pending_subscriber(email).verify(self.now).unwrap() {
            VerificationOutcome::Verified(subscriber) => subscriber,
            VerificationOutcome::AlreadyVerified => unreachable!("新規の購読者は未検証"),
        }
    }

    /// Mock 群を含む SUT（System Under Test）を構築
    pub async fn build(self) -> NewsletterTestSetup {
        let clock = Arc::new(FixedClock::new(self.now));
        let secret_codec = self.secret_codec();

        let subscriber_repo = MockSubscriberRepository::new();
        let template_repo = MockEmailTemplateRepository::new();
        let settings_repo = MockMailSettingsRepository::new();
        let delivery_log_repo = MockDeliveryLogRepository::new();
        let transport = MockMailTransport::new();
        let transport_factory = MockTransportFactory::new(transport.clone());

        if self.mail_enabled {
            settings_repo.set(self.deliverable_settings());
        }
        let settings_provider = Arc::new(
            MailSettingsProvider::load(Arc::new(settings_repo.clone()))
                .await
                .unwrap(),
        );

        let template_store = Arc::new(TemplateStore::new(
            Arc::new(template_repo.clone()),
            TemplateRenderer::new().unwrap(),
            clock.clone(),
        ));
        if self.seed_templates {
            template_store.ensure_seeded().await.unwrap();
        }

        let mail_sender = Arc::new(MailSender::new(
            Arc::new(transport_factory.clone()),
            template_store.clone(),
            Arc::new(delivery_log_repo.clone()),
            clock.clone(),
            self.retry_policy,
            self.site.name.clone(),
        ));

        let subscription = Arc::new(SubscriptionUseCaseImpl::new(
            Arc::new(subscriber_repo.clone()),
            mail_sender.clone(),
            clock.clone(),
            self.site.clone(),
            DeliveryMode::Inline,
        ));
        let campaign = Arc::new(CampaignDispatcher::new(
            Arc::new(subscriber_repo.clone()),
            template_store.clone(),
            mail_sender.clone(),
            settings_provider.clone(),
            self.campaign_policy,
            self.site.clone(),
        ));
        let mail_settings = Arc::new(MailSettingsUseCaseImpl::new(
            settings_provider.clone(),
            secret_codec.clone(),
            Arc::new(transport_factory.clone()),
        ));
        let delivery_logs = Arc::new(DeliveryLogUseCaseImpl::new(Arc::new(
            delivery_log_repo.clone(),
        )));
        let subscribers = Arc::new(SubscriberAdminUseCaseImpl::new(
            Arc::new(subscriber_repo.clone()),
            clock.clone(),
        ));

        NewsletterTestSetup {
            site: self.site.clone(),
            builder: self,
            clock,
            secret_codec,
            subscriber_repo,
            template_repo,
            settings_repo,
            delivery_log_repo,
            transport,
            transport_factory,
            settings_provider,
            template_store,
            mail_sender,
            subscription,
            campaign,
            mail_settings,
            delivery_logs,
            subscribers,
        }
    }
}

impl Default for NewsletterTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
