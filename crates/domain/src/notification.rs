//! # 通知
//!
//! メール送信に関するドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`EmailMessage`] | メールメッセージ | レンダリング済みの件名と本文 |
//! | [`SendResult`] | 送信結果 | 成功可否、メッセージ ID、エラー |
//! | [`PublishedRecipe`] | レシピ公開イベント | キャンペーン配信のトリガー |
//! | [`ConnectionTestResult`] | 接続テスト結果 | 運用者向けの失敗分類付き |
//!
//! ## 設計方針
//!
//! - **送信は例外を投げない**: 送信経路のエラーはすべて [`SendResult`] に畳み込み、
//!   呼び出し元が致命的かどうかを判断する
//! - **再試行の対象は配送失敗のみ**: 設定不備や復号失敗は再試行しても直らない

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::email_template::TemplateKind;

/// 通知送信エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// 送信設定が無効または不完全で、トランスポートを作れない
    #[error("メール送信が利用できません（送信設定が無効または未設定です）")]
    TransportUnavailable,

    /// 設定不備（パスフレーズ未設定など）
    #[error("メール送信設定エラー: {0}")]
    Configuration(String),

    /// 保存済みパスワードの復号に失敗
    #[error("パスワードの復号に失敗: {0}")]
    Decryption(String),

    /// 宛先アドレス不正などでメッセージを組み立てられない
    #[error("メッセージを構築できません: {0}")]
    InvalidMessage(String),

    /// メール送信に失敗（再試行対象）
    #[error("メール送信に失敗: {0}")]
    SendFailed(String),

    /// テンプレートレンダリングに失敗
    #[error("テンプレートレンダリングに失敗: {0}")]
    TemplateFailed(String),

    /// 指定種別のテンプレートが存在しない
    #[error("テンプレートが見つかりません: {0}")]
    TemplateMissing(TemplateKind),
}

impl NotificationError {
    /// 再試行で回復しうるエラーか
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SendFailed(_))
    }
}

/// メールメッセージ
///
/// テンプレートレンダリングの出力。トランスポートに渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// 送信先メールアドレス
    pub to:        String,
    /// 件名
    pub subject:   String,
    /// HTML 本文
    pub html_body: String,
    /// プレーンテキスト本文
    pub text_body: String,
}

/// 送信結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResult {
    pub success:    bool,
    pub message_id: Option<String>,
    pub error:      Option<String>,
}

impl SendResult {
    pub fn sent(message_id: String) -> Self {
        Self {
            success:    true,
            message_id: Some(message_id),
            error:      None,
        }
    }

    pub fn failed(error: &NotificationError) -> Self {
        Self {
            success:    false,
            message_id: None,
            error:      Some(error.to_string()),
        }
    }
}

/// レシピ公開イベント
///
/// レシピ管理側から通知され、新着レシピのキャンペーン配信を起動する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRecipe {
    pub id:           String,
    pub title:        String,
    /// HTML を含む説明文
    pub description:  String,
    /// 画像の参照（相対パスまたは絶対 URL）
    pub image_url:    Option<String>,
    /// 調理時間（分）
    pub cooking_time: u32,
    /// 人数
    pub servings:     u32,
    /// カロリー（kcal）
    pub calories:     u32,
}

/// 接続テストの失敗分類
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionFailureKind {
    /// 認証失敗（ユーザー名・パスワード誤り）
    Authentication,
    /// 接続失敗（DNS、接続拒否、TLS ハンドシェイク）
    Network,
    /// タイムアウト
    Timeout,
    /// SMTP プロトコルレベルでの拒否
    Protocol,
    /// 設定不備（未設定、復号失敗）
    Configuration,
}

/// 接続テスト結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTestResult {
    pub success:      bool,
    pub message:      String,
    pub failure_kind: Option<ConnectionFailureKind>,
}

impl ConnectionTestResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success:      true,
            message:      message.into(),
            failure_kind: None,
        }
    }

    pub fn failed(kind: ConnectionFailureKind, message: impl Into<String>) -> Self {
        Self {
            success:      false,
            message:      message.into(),
            failure_kind: Some(kind),
        }
    }
}
