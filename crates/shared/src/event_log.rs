//! # 構造化イベントログ
//!
//! 購読・配信・キャンペーンの節目を、集計しやすい固定のフィールド名で出力する。
//!
//! ```text
//! event.kind        = "business_event"（マクロが付与）
//! event.category    = newsletter | notification | campaign
//! event.action      = subscriber.verified など
//! event.entity_type = subscriber | delivery_log | recipe
//! event.entity_id
//! event.result      = success | failure
//! ```
//!
//! 失敗ログには `error.category` と `error.kind` を付ける（[`error`]）。
//! 値は文字列定数で持ち、呼び出し側での綴り違いを防ぐ。

/// `event.kind = "business_event"` を付けて info レベルで出力する
///
/// ```ignore
/// log_business_event!(
///     event.category = event::category::NEWSLETTER,
///     event.action = event::action::VERIFIED,
///     event.entity_type = event::entity_type::SUBSCRIBER,
///     event.entity_id = %subscriber.id(),
///     event.result = event::result::SUCCESS,
///     "購読を確認しました"
/// );
/// ```
#[macro_export]
macro_rules! log_business_event {
    ($($field:tt)*) => {
        ::tracing::info!(event.kind = "business_event", $($field)*)
    };
}

/// `event.*` の値
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const NEWSLETTER: &str = "newsletter";
        pub const NOTIFICATION: &str = "notification";
        pub const CAMPAIGN: &str = "campaign";
    }

    /// イベントアクション
    pub mod action {
        // 購読者
        pub const SUBSCRIBED: &str = "subscriber.subscribed";
        pub const RESUBSCRIBED: &str = "subscriber.resubscribed";
        pub const VERIFIED: &str = "subscriber.verified";
        pub const UNSUBSCRIBED: &str = "subscriber.unsubscribed";
        pub const RETENTION_SWEEP: &str = "subscriber.retention_sweep";

        // 通知
        pub const NOTIFICATION_SENT: &str = "notification.sent";
        pub const NOTIFICATION_FAILED: &str = "notification.failed";

        // キャンペーン
        pub const CAMPAIGN_STARTED: &str = "campaign.started";
        pub const CAMPAIGN_COMPLETED: &str = "campaign.completed";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const SUBSCRIBER: &str = "subscriber";
        pub const DELIVERY_LOG: &str = "delivery_log";
        pub const RECIPE: &str = "recipe";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部サービス呼び出し（SMTP サーバー）
        pub const EXTERNAL_SERVICE: &str = "external_service";
        /// 設定不備（送信設定、パスフレーズ）
        pub const CONFIGURATION: &str = "configuration";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const SMTP: &str = "smtp";
        pub const TEMPLATE: &str = "template";
        pub const SECRET: &str = "secret";
        pub const DELIVERY_LOG: &str = "delivery_log";
    }
}
