//! # Newsletter Service サーバー
//!
//! レシピサイトのニュースレターとトランザクションメールを扱うサービス。
//!
//! ## 役割
//!
//! - **購読管理**: ダブルオプトインによる購読・確認・配信停止
//! - **キャンペーン配信**: レシピ公開時に配信対象の購読者へ一斉送信
//! - **送信設定・テンプレート管理**: 管理画面向けの内部 API
//!
//! ## 公開範囲
//!
//! `/newsletter/*` は購読フォームとメール内リンクから呼ばれる公開 API。
//! `/internal/*` は管理画面とレシピ管理側からのみ呼ばれる前提とし、
//! このサービス自身は認証を行わない。
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `NEWSLETTER_HOST` | No | バインドアドレス（デフォルト: `0.0.0.0`） |
//! | `NEWSLETTER_PORT` | **Yes** | ポート番号 |
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `MAIL_SECRET_PASSPHRASE` | No | 送信用パスワードの暗号化キー（未設定だと送信不可） |
//! | `SITE_BASE_URL` | No | メール内リンクのベース URL（デフォルト: `http://localhost:3000`） |
//! | `SITE_NAME` | No | サイト名（デフォルト: `Recipebox`） |
//! | `LOG_FORMAT` | No | `json` / `pretty` |
//!
//! ## 起動方法
//!
//! ```bash
//! NEWSLETTER_PORT=3100 DATABASE_URL=postgres://... cargo run -p recipebox-newsletter-service
//! ```

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{delete, get, post},
};
use recipebox_domain::clock::{Clock, SystemClock};
use recipebox_infra::{
    MailSettingsProvider,
    SecretCodec,
    SmtpTransportFactory,
    TransportFactory,
    db,
    mail::TransportTimeouts,
    repository::{
        PostgresDeliveryLogRepository,
        PostgresEmailTemplateRepository,
        PostgresMailSettingsRepository,
        PostgresSubscriberRepository,
    },
};
use recipebox_newsletter_service::{
    config::{CampaignPolicy, DeliveryMode, NewsletterConfig, RetryPolicy},
    handler::{
        CampaignState,
        DeliveryLogState,
        EmailTemplateState,
        MailSettingsState,
        SubscriberState,
        SubscriptionState,
        create_template,
        delete_subscriber,
        delete_template,
        get_delivery_stats,
        get_mail_settings,
        get_subscriber_stats,
        get_template,
        health_check,
        list_delivery_logs,
        list_subscribers,
        list_templates,
        preview_template,
        purge_unverified_subscribers,
        recipe_published,
        set_default_template,
        subscribe,
        test_mail_connection,
        unsubscribe_by_email,
        unsubscribe_by_token,
        update_mail_settings,
        update_template,
        verify,
    },
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
use recipebox_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Newsletter Service サーバーのエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(TracingConfig::from_env("newsletter-service"));

    let config = NewsletterConfig::from_env()?;

    tracing::info!(
        "Newsletter Service サーバーを起動します: {}:{}",
        config.host,
        config.port
    );

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("データベースに接続しました");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let secret_codec = SecretCodec::new(config.mail_secret_passphrase.clone());
    if !secret_codec.is_configured() {
        tracing::warn!("MAIL_SECRET_PASSPHRASE が未設定のため、メールは送信できません");
    }

    // 送信設定とトランスポート
    let settings_provider = Arc::new(
        MailSettingsProvider::load(Arc::new(PostgresMailSettingsRepository::new(pool.clone())))
            .await?,
    );
    let transport_factory: Arc<dyn TransportFactory> = Arc::new(SmtpTransportFactory::new(
        settings_provider.clone(),
        secret_codec.clone(),
        TransportTimeouts::default(),
    ));

    // テンプレート
    let template_store = Arc::new(TemplateStore::new(
        Arc::new(PostgresEmailTemplateRepository::new(pool.clone())),
        TemplateRenderer::new()?,
        clock.clone(),
    ));
    let seeded = template_store.ensure_seeded().await?;
    if seeded > 0 {
        tracing::info!(seeded, "組み込みテンプレートを投入しました");
    }

    // 送信と配信ログ
    let delivery_log_repo = Arc::new(PostgresDeliveryLogRepository::new(pool.clone()));
    let mail_sender = Arc::new(MailSender::new(
        transport_factory.clone(),
        template_store.clone(),
        delivery_log_repo.clone(),
        clock.clone(),
        RetryPolicy::default(),
        config.site.name.clone(),
    ));

    // 購読者
    let subscriber_repo = Arc::new(PostgresSubscriberRepository::new(pool.clone()));
    let subscription_state = Arc::new(SubscriptionState {
        usecase: Arc::new(SubscriptionUseCaseImpl::new(
            subscriber_repo.clone(),
            mail_sender.clone(),
            clock.clone(),
            config.site.clone(),
            DeliveryMode::Background,
        )),
    });
    let subscriber_state = Arc::new(SubscriberState {
        usecase: Arc::new(SubscriberAdminUseCaseImpl::new(
            subscriber_repo.clone(),
            clock.clone(),
        )),
    });

    // キャンペーン
    let campaign_state = Arc::new(CampaignState {
        dispatcher: Arc::new(CampaignDispatcher::new(
            subscriber_repo,
            template_store.clone(),
            mail_sender,
            settings_provider.clone(),
            CampaignPolicy::default(),
            config.site.clone(),
        )),
    });

    // 管理 API
    let mail_settings_state = Arc::new(MailSettingsState {
        usecase: Arc::new(MailSettingsUseCaseImpl::new(
            settings_provider,
            secret_codec,
            transport_factory,
        )),
    });
    let email_template_state = Arc::new(EmailTemplateState {
        store: template_store,
    });
    let delivery_log_state = Arc::new(DeliveryLogState {
        usecase: Arc::new(DeliveryLogUseCaseImpl::new(delivery_log_repo)),
    });

    // ルーター構築
    let app = Router::new()
        .route("/health", get(health_check))
        // 購読（公開 API）
        .route("/newsletter/subscribe", post(subscribe))
        .route("/newsletter/verify/{token}", get(verify))
        .route("/newsletter/unsubscribe/{token}", get(unsubscribe_by_token))
        .route("/newsletter/unsubscribe", post(unsubscribe_by_email))
        .with_state(subscription_state)
        // 送信設定
        .route(
            "/internal/mail-settings",
            get(get_mail_settings).patch(update_mail_settings),
        )
        .route("/internal/mail-settings/test", post(test_mail_connection))
        .with_state(mail_settings_state)
        // テンプレート
        .route(
            "/internal/email-templates",
            get(list_templates).post(create_template),
        )
        .route(
            "/internal/email-templates/{id}",
            get(get_template)
                .patch(update_template)
                .delete(delete_template),
        )
        .route(
            "/internal/email-templates/{id}/default",
            post(set_default_template),
        )
        .route(
            "/internal/email-templates/{id}/preview",
            post(preview_template),
        )
        .with_state(email_template_state)
        // 配信ログ
        .route("/internal/delivery-logs", get(list_delivery_logs))
        .route("/internal/delivery-logs/stats", get(get_delivery_stats))
        .with_state(delivery_log_state)
        // 購読者管理
        .route("/internal/subscribers", get(list_subscribers))
        .route("/internal/subscribers/stats", get(get_subscriber_stats))
        .route("/internal/subscribers/{id}", delete(delete_subscriber))
        .route(
            "/internal/subscribers/purge-unverified",
            post(purge_unverified_subscribers),
        )
        .with_state(subscriber_state)
        // レシピ公開イベント
        .route("/internal/recipes/published", post(recipe_published))
        .with_state(campaign_state)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Newsletter Service サーバーが起動しました: {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
