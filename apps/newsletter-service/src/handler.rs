//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## 設計方針
//!
//! - 各ハンドラはサブモジュールに配置
//! - 親モジュール（この `handler.rs`）で re-export し、フラットな API を提供
//! - ハンドラは薄く保ち、ビジネスロジックはユースケース層に委譲
//! - 認証・レート制限は前段のゲートウェイが担う。`/internal` 配下は内部ネットワーク専用

pub mod campaign;
pub mod delivery_log;
pub mod email_template;
pub mod health;
pub mod mail_settings;
pub mod subscriber;
pub mod subscription;

pub use campaign::{CampaignState, recipe_published};
pub use delivery_log::{DeliveryLogState, get_delivery_stats, list_delivery_logs};
pub use email_template::{
    EmailTemplateState,
    create_template,
    delete_template,
    get_template,
    list_templates,
    preview_template,
    set_default_template,
    update_template,
};
pub use health::health_check;
pub use mail_settings::{
    MailSettingsState,
    get_mail_settings,
    test_mail_connection,
    update_mail_settings,
};
pub use subscriber::{
    SubscriberState,
    delete_subscriber,
    get_subscriber_stats,
    list_subscribers,
    purge_unverified_subscribers,
};
pub use subscription::{
    SubscriptionState,
    subscribe,
    unsubscribe_by_email,
    unsubscribe_by_token,
    verify,
};
