//! # シークレットコーデック
//!
//! 送信用メールアカウントのパスワードを AES-256-GCM で暗号化・復号する。
//!
//! ## 形式
//!
//! ```text
//! hex(nonce 12 バイト) ":" hex(ciphertext + tag)
//! ```
//!
//! - 鍵は設定されたパスフレーズの SHA-256 ハッシュ（32 バイト）
//! - nonce は呼び出しごとに乱数で生成するため、同じ平文でも暗号文は毎回異なる
//! - 空文字列は暗号化・復号ともに空文字列を返す（「未設定」を表す）
//!
//! パスフレーズが暗号化時から変わると復号は失敗する。運用者がパスワードを
//! 再入力する以外に回復手段はない。

use aes_gcm::{
    Aes256Gcm,
    Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// シークレットコーデックのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    /// パスフレーズが設定されていない（設定エラー）
    #[error("MAIL_SECRET_PASSPHRASE が設定されていません")]
    MissingPassphrase,

    /// 暗号文の形式が不正
    #[error("暗号文の形式が不正です: {0}")]
    Malformed(String),

    /// 復号に失敗（パスフレーズ変更または改ざん）
    #[error("復号に失敗しました。パスワードを再設定してください")]
    Decryption,

    /// 暗号化に失敗
    #[error("暗号化に失敗しました")]
    Encryption,
}

/// シークレットコーデック
///
/// パスフレーズを保持するため `Debug` では値を出力しない。
#[derive(Clone)]
pub struct SecretCodec {
    passphrase: Option<String>,
}

impl SecretCodec {
    /// パスフレーズを指定して作成する
    ///
    /// 空文字列は未設定として扱う。
    pub fn new(passphrase: Option<String>) -> Self {
        Self {
            passphrase: passphrase.filter(|p| !p.is_empty()),
        }
    }

    /// パスフレーズが設定されているか
    pub fn is_configured(&self) -> bool {
        self.passphrase.is_some()
    }

    /// 平文を暗号化する
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let cipher = self.cipher()?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(&nonce.into(), plaintext.as_bytes())
            .map_err(|_| SecretError::Encryption)?;

        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    /// 暗号文を復号する
    pub fn decrypt(&self, encrypted: &str) -> Result<String, SecretError> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }

        let cipher = self.cipher()?;

        let Some((nonce_hex, ciphertext_hex)) = encrypted.split_once(':') else {
            return Err(SecretError::Malformed("区切り文字 ':' がありません".to_string()));
        };
        let nonce = hex::decode(nonce_hex)
            .map_err(|e| SecretError::Malformed(format!("nonce: {e}")))?;
        if nonce.len() != NONCE_LEN {
            return Err(SecretError::Malformed(format!(
                "nonce の長さが不正です: {}",
                nonce.len()
            )));
        }
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|e| SecretError::Malformed(format!("ciphertext: {e}")))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| SecretError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| SecretError::Decryption)
    }

    fn cipher(&self) -> Result<Aes256Gcm, SecretError> {
        let passphrase = self
            .passphrase
            .as_deref()
            .ok_or(SecretError::MissingPassphrase)?;
        let key: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
        Ok(Aes256Gcm::new(&key.into()))
    }
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec")
            .field("configured", &self.is_configured())
            .finish()
    }
}
