//! # 購読者
//!
//! ニュースレター購読者エンティティとダブルオプトインの状態遷移を定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`Subscriber`] | 購読者 | ニュースレターに登録されたメールアドレス |
//! | [`SubscriberStatus`] | 購読状態 | `pending` / `active` / `unsubscribed` |
//! | [`SubscriptionError`] | 状態遷移の拒否 | 購読済み、解除済み、トークン期限切れ |
//!
//! ## 状態遷移
//!
//! ```text
//!              subscribe                    verify (≤ 24h)
//!   (なし) ─────────────→ Pending ─────────────────────→ Active
//!                            ↑  ↑                          │
//!                resubscribe │  └──────── resubscribe ──────┤ (未検証のみ)
//!                            │                             │ unsubscribe
//!                     Unsubscribed ←───────────────────────┘
//! ```
//!
//! - 検証済み (`verified = true`) ならば `status != Pending`
//! - 検証トークンは検証成功後も保持し、二重クリックでも成功を返す
//! - トークンの有効期限は `subscribed_date` を起点に計算する
//!
//! トークン文字列の生成はインフラ層が担い、ここでは受け取るだけ。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::DomainError;

/// 検証トークンの有効期間（時間）
pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

/// 未検証購読者の保持期間（日）
pub const UNVERIFIED_RETENTION_DAYS: i64 = 7;

define_uuid_id! {
    /// 購読者 ID（一意識別子）
    pub struct SubscriberId;
}

/// 購読者のメールアドレス（値オブジェクト）
///
/// 大文字小文字の正規化は行わず、入力された文字列をそのまま保持する。
/// 一意性はストレージ側で完全一致として扱われる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    /// メールアドレスを作成する
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - `local@domain` の形式で、ドメインに `.` を含む
    /// - 空白を含まない
    /// - 最大 255 文字
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスは必須です".to_string(),
            ));
        }

        let Some((local, domain)) = value.split_once('@') else {
            return Err(DomainError::Validation(
                "メールアドレスの形式が不正です".to_string(),
            ));
        };

        if local.is_empty()
            || domain.is_empty()
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || domain.contains('@')
            || value.chars().any(char::is_whitespace)
        {
            return Err(DomainError::Validation(
                "メールアドレスの形式が不正です".to_string(),
            ));
        }

        if value.chars().count() > 255 {
            return Err(DomainError::Validation(
                "メールアドレスは255文字以内である必要があります".to_string(),
            ));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 所有権を持つ文字列に変換する
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SubscriberEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 購読状態
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriberStatus {
    /// 検証待ち
    Pending,
    /// 配信対象
    Active,
    /// 購読解除済み
    Unsubscribed,
}

/// 状態遷移の拒否理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// 検証済みかつ有効な購読者への再登録
    #[error("このメールアドレスは既に購読済みです")]
    AlreadySubscribed,

    /// 解除済みの購読者への再度の解除
    #[error("このメールアドレスは既に購読解除されています")]
    AlreadyUnsubscribed,

    /// 検証トークンの有効期限切れ
    #[error("確認リンクの有効期限が切れています。もう一度登録してください")]
    TokenExpired,

    /// 未検証のまま解除された購読者の確認リンク
    #[error("配信停止済みのため、この確認リンクは使用できません。もう一度登録してください")]
    VerificationRevoked,
}

/// 検証の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// 今回の呼び出しで検証された（ウェルカムメールの送信対象）
    Verified(Subscriber),
    /// 既に検証済みだった（状態は変更しない）
    AlreadyVerified,
}

/// 購読者エンティティ
///
/// # 不変条件
///
/// - `email` はストレージ上で一意（完全一致）
/// - `verified` が true ならば `status` は `Pending` ではない
/// - `unsubscribe_token` は一度発行されたら購読者の生存期間中変わらない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    id: SubscriberId,
    email: SubscriberEmail,
    status: SubscriberStatus,
    verified: bool,
    verified_at: Option<DateTime<Utc>>,
    verification_token: Option<String>,
    unsubscribe_token: Option<String>,
    subscribed_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Subscriber {
    /// 新しい購読者を作成する
    ///
    /// 作成時は `Pending` かつ未検証で、両方のトークンを持つ。
    pub fn new(
        id: SubscriberId,
        email: SubscriberEmail,
        verification_token: String,
        unsubscribe_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            status: SubscriberStatus::Pending,
            verified: false,
            verified_at: None,
            verification_token: Some(verification_token),
            unsubscribe_token: Some(unsubscribe_token),
            subscribed_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// 既存のデータから購読者を復元する（データベースから取得時）
    #[allow(clippy::too_many_arguments)]
    pub fn from_db(
        id: SubscriberId,
        email: SubscriberEmail,
        status: SubscriberStatus,
        verified: bool,
        verified_at: Option<DateTime<Utc>>,
        verification_token: Option<String>,
        unsubscribe_token: Option<String>,
        subscribed_date: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            status,
            verified,
            verified_at,
            verification_token,
            unsubscribe_token,
            subscribed_date,
            created_at,
            updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn email(&self) -> &SubscriberEmail {
        &self.email
    }

    pub fn status(&self) -> SubscriberStatus {
        self.status
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    pub fn verification_token(&self) -> Option<&str> {
        self.verification_token.as_deref()
    }

    pub fn unsubscribe_token(&self) -> Option<&str> {
        self.unsubscribe_token.as_deref()
    }

    pub fn subscribed_date(&self) -> DateTime<Utc> {
        self.subscribed_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ビジネスロジックメソッド

    /// キャンペーン配信の対象か判定する
    pub fn is_campaign_recipient(&self) -> bool {
        self.status == SubscriberStatus::Active && self.verified
    }

    /// 検証トークンが期限切れか判定する
    ///
    /// 経過時間がちょうど 24 時間の場合はまだ有効。
    pub fn is_verification_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.subscribed_date > Duration::hours(VERIFICATION_TOKEN_TTL_HOURS)
    }

    /// 保持期間を過ぎた未検証購読者か判定する
    pub fn is_stale_unverified(&self, now: DateTime<Utc>) -> bool {
        !self.verified && self.subscribed_date < retention_cutoff(now)
    }

    /// 既存の購読者が再度登録を申し込んだ場合の遷移
    ///
    /// 新しい検証トークンを発行し、`subscribed_date` をリセットして `Pending` に戻す。
    /// 購読解除トークンは既存のものを再利用し、無い場合のみ `fallback_unsubscribe_token`
    /// を採用する。
    ///
    /// # エラー
    ///
    /// `Active` かつ検証済みの場合は [`SubscriptionError::AlreadySubscribed`]。
    pub fn resubscribe(
        self,
        verification_token: String,
        fallback_unsubscribe_token: String,
        now: DateTime<Utc>,
    ) -> Result<Self, SubscriptionError> {
        if self.is_campaign_recipient() {
            return Err(SubscriptionError::AlreadySubscribed);
        }

        let unsubscribe_token = self
            .unsubscribe_token
            .or(Some(fallback_unsubscribe_token));

        Ok(Self {
            status: SubscriberStatus::Pending,
            verified: false,
            verification_token: Some(verification_token),
            unsubscribe_token,
            subscribed_date: now,
            updated_at: now,
            ..self
        })
    }

    /// 検証トークンによる確認
    ///
    /// 既に検証済みなら状態を変えずに [`VerificationOutcome::AlreadyVerified`] を返す。
    /// 未検証なら `subscribed_date` からの経過時間で期限を判定し、有効なら `Active` にする。
    ///
    /// 未検証のまま解除された購読者は、古い確認リンクでは復帰させない
    /// ([`SubscriptionError::VerificationRevoked`])。復帰は再登録で行う。
    pub fn verify(self, now: DateTime<Utc>) -> Result<VerificationOutcome, SubscriptionError> {
        if self.verified {
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        if self.is_verification_expired(now) {
            return Err(SubscriptionError::TokenExpired);
        }

        if self.status == SubscriberStatus::Unsubscribed {
            return Err(SubscriptionError::VerificationRevoked);
        }

        Ok(VerificationOutcome::Verified(Self {
            status: SubscriberStatus::Active,
            verified: true,
            verified_at: Some(now),
            updated_at: now,
            ..self
        }))
    }

    /// 購読解除
    ///
    /// 検証フラグはそのまま残す。
    pub fn unsubscribe(self, now: DateTime<Utc>) -> Result<Self, SubscriptionError> {
        if self.status == SubscriberStatus::Unsubscribed {
            return Err(SubscriptionError::AlreadyUnsubscribed);
        }

        Ok(Self {
            status: SubscriberStatus::Unsubscribed,
            updated_at: now,
            ..self
        })
    }
}

/// 保持期間の境界日時（これより前に登録された未検証購読者は削除対象）
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(UNVERIFIED_RETENTION_DAYS)
}
