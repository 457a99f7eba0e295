//! # ドメインエラー
//!
//! 入力値の検証とエンティティの不変条件の違反を表す。状態遷移の拒否
//! （購読済み、期限切れなど）は [`crate::subscriber::SubscriptionError`] で別に扱う。
//!
//! サービス層では `CoreError::BadRequest`（400）に変換される。

use thiserror::Error;

/// ドメイン層で発生するエラー
#[derive(Debug, Error)]
pub enum DomainError {
    /// メールアドレスの形式、テンプレート名、変数名などの検証失敗
    #[error("バリデーションエラー: {0}")]
    Validation(String),
}
