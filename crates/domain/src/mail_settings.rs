//! # 送信用メールアカウント設定
//!
//! SMTP 接続先と送信者情報を保持するシングルトン設定。
//!
//! パスワードは平文では保持せず、暗号化済みの文字列（`iv:ciphertext`）のみを持つ。
//! 空文字列は「未設定」を意味する。

use chrono::{DateTime, Utc};

/// 送信用メールアカウント設定
///
/// `Debug` 出力では暗号化済みパスワードを `[REDACTED]` に置き換える。
#[derive(Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub host:               String,
    pub port:               u16,
    /// 暗号化トランスポート（SMTPS）を使うか
    pub secure:             bool,
    pub username:           String,
    /// 暗号化済みパスワード（空文字列は未設定）
    pub encrypted_password: String,
    pub from_name:          String,
    pub from_email:         String,
    pub enabled:            bool,
    pub updated_at:         Option<DateTime<Utc>>,
}

impl MailSettings {
    /// パスワードが設定されているか
    pub fn has_secret(&self) -> bool {
        !self.encrypted_password.is_empty()
    }

    /// 送信に必要な項目が揃っていて、かつ有効化されているか
    pub fn is_deliverable(&self) -> bool {
        self.enabled && !self.host.is_empty() && !self.username.is_empty() && self.has_secret()
    }

    /// 差出人アドレス（送信者名があれば `名前 <address>` 形式）
    pub fn from_mailbox(&self) -> String {
        let from_email = if self.from_email.is_empty() {
            &self.username
        } else {
            &self.from_email
        };

        if self.from_name.is_empty() {
            from_email.to_string()
        } else {
            format!("{} <{}>", self.from_name, from_email)
        }
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            host:               String::new(),
            port:               587,
            secure:             false,
            username:           String::new(),
            encrypted_password: String::new(),
            from_name:          String::new(),
            from_email:         String::new(),
            enabled:            false,
            updated_at:         None,
        }
    }
}

impl std::fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("encrypted_password", &"[REDACTED]")
            .field("from_name", &self.from_name)
            .field("from_email", &self.from_email)
            .field("enabled", &self.enabled)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
