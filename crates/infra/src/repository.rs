//! # リポジトリ実装
//!
//! 永続化のトレイトと PostgreSQL 実装を提供する。
//!
//! ## 設計方針
//!
//! - **トレイト経由で注入**: ユースケースは `Arc<dyn XxxRepository>` を保持し、
//!   テストでは [`crate::mock`] のインメモリ実装に差し替える
//! - **実行時クエリ**: `sqlx::query_as` と `FromRow` で行を読み、ドメイン型への変換は
//!   `TryFrom` で行う（保存値が不正な場合は `InfraError::invalid_data`）

pub mod delivery_log_repository;
pub mod email_template_repository;
pub mod mail_settings_repository;
pub mod subscriber_repository;

pub use delivery_log_repository::{DeliveryLogRepository, PostgresDeliveryLogRepository};
pub use email_template_repository::{EmailTemplateRepository, PostgresEmailTemplateRepository};
pub use mail_settings_repository::{MailSettingsRepository, PostgresMailSettingsRepository};
pub use subscriber_repository::{
    PostgresSubscriberRepository,
    SubscriberCounts,
    SubscriberRepository,
};
