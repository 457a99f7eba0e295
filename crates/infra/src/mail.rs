//! # メール送信
//!
//! 送信用トランスポートとその生成を担当するインフラストラクチャモジュール。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: [`MailTransport`] で 1 通の送信を、[`TransportFactory`] で
//!   送信設定からのトランスポート生成と接続テストを抽象化する
//! - **送信ごとに生成**: ファクトリは送信 1 通ごとに呼ばれ、毎回パスワードを復号する。
//!   設定変更は次の送信から反映される
//! - **None は「送信不可」**: 送信設定が無効・不完全な場合はエラーではなく `None` を返し、
//!   呼び出し側は劣化運転（送信をスキップ）として扱う

mod smtp;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use recipebox_domain::notification::{ConnectionTestResult, EmailMessage, NotificationError};
pub use smtp::{SmtpMailTransport, SmtpTransportFactory};

/// メール送信トレイト
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// メールを 1 通送信し、付与したメッセージ ID を返す
    async fn send_email(&self, email: &EmailMessage) -> Result<String, NotificationError>;
}

/// トランスポート生成トレイト
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// 現在の送信設定からトランスポートを生成する
    ///
    /// - 送信設定が無効、またはホスト・アカウント・パスワードが未設定なら `Ok(None)`
    /// - パスフレーズ未設定や復号失敗は `Err`（再試行しても回復しない）
    fn create(&self) -> Result<Option<Arc<dyn MailTransport>>, NotificationError>;

    /// メールを送らずに SMTP ハンドシェイクと認証だけを行う
    async fn test_connection(&self) -> ConnectionTestResult;
}

/// SMTP 接続のタイムアウト
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    /// 接続・グリーティング・ソケット読み書きのタイムアウト
    pub timeout: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}
