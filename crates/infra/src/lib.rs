//! # Recipebox インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プール管理とマイグレーション
//! - **リポジトリ実装**: 購読者、テンプレート、送信設定、配信ログの永続化
//! - **シークレット保護**: 送信用アカウントのパスワードの暗号化・復号
//! - **メール送信**: SMTP トランスポートの生成と接続テスト
//!
//! ## 依存関係
//!
//! ```text
//! newsletter-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`error`] - インフラ層エラー定義
//! - [`repository`] - リポジトリ実装
//! - [`secret_codec`] - パスワードの暗号化・復号
//! - [`mail_settings_provider`] - 送信設定のキャッシュと再読み込み
//! - [`mail`] - SMTP トランスポートとファクトリ
//! - [`token`] - 検証・購読解除トークンの生成

pub mod db;
pub mod error;
pub mod mail;
pub mod mail_settings_provider;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod repository;
pub mod secret_codec;
pub mod token;

pub use error::InfraError;
pub use mail::{MailTransport, SmtpTransportFactory, TransportFactory};
pub use mail_settings_provider::MailSettingsProvider;
pub use secret_codec::{SecretCodec, SecretError};
