//! # Recipebox ドメイン層
//!
//! ニュースレター配信とトランザクションメールの中核となるドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **エンティティ**: 一意の識別子を持つオブジェクト（Subscriber, EmailTemplate, DeliveryLog）
//! - **状態遷移**: 購読者のダブルオプトインはエンティティのメソッドとして表現し、
//!   不正な遷移は [`subscriber::SubscriptionError`] で拒否する
//! - **I/O を持たない**: トークン生成・暗号化・DB・SMTP はインフラ層の責務
//!
//! ## 依存関係の方向
//!
//! ```text
//! newsletter-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`clock`] - 時刻プロバイダ
//! - [`error`] - ドメイン層で発生するエラーの定義
//! - [`subscriber`] - 購読者とダブルオプトインの状態遷移
//! - [`email_template`] - メールテンプレートと種別ごとのテンプレート変数
//! - [`mail_settings`] - 送信用メールアカウント設定
//! - [`delivery_log`] - 配信ログ
//! - [`notification`] - メールメッセージ、送信結果、公開イベント

#[macro_use]
mod macros;

pub mod clock;
pub mod delivery_log;
pub mod email_template;
pub mod error;
pub mod mail_settings;
pub mod notification;
pub mod subscriber;

pub use error::DomainError;
