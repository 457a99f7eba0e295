//! # ユースケース層
//!
//! ニュースレターとトランザクションメールのビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリ・トランスポート・時刻を `Arc<dyn Trait>` で外部から注入
//! - **薄いハンドラ**: ハンドラは薄く保ち、ロジックはユースケースに集約
//! - **送信は [`MailSender`] に集約**: レンダリング・再試行・配信ログの記録を一箇所で行う
//!
//! ## モジュール構成
//!
//! - `template_renderer`: プレースホルダと条件ブロックのレンダリング
//! - `template_store`: テンプレートの管理と種別ごとの既定テンプレートの解決
//! - `mail_sender`: 再試行付きのメール送信と配信ログ
//! - `subscription`: ダブルオプトインの購読ライフサイクル
//! - `campaign`: 新着レシピのキャンペーン配信
//! - `mail_settings`: 送信設定の管理と接続テスト
//! - `delivery_log`: 配信ログの参照
//! - `subscriber_admin`: 購読者の管理と保持期間による削除

pub mod campaign;
pub mod delivery_log;
pub mod mail_sender;
pub mod mail_settings;
pub mod subscriber_admin;
pub mod subscription;
pub mod template_renderer;
pub mod template_store;

pub use campaign::{CampaignDispatcher, CampaignOutcome, CampaignSummary};
pub use delivery_log::DeliveryLogUseCaseImpl;
pub use mail_sender::{MailContent, MailSender, SendRequest};
pub use mail_settings::{MailSettingsUseCaseImpl, MailSettingsView, UpdateMailSettingsInput};
pub use subscriber_admin::SubscriberAdminUseCaseImpl;
pub use subscription::{SubscriptionMessage, SubscriptionUseCaseImpl};
pub use template_renderer::{RenderMode, RenderedEmail, TemplateRenderer};
pub use template_store::{CreateTemplateInput, TemplateStore, UpdateTemplateInput};
