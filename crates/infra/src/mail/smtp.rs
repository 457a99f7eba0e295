//! SMTP トランスポート実装
//!
//! lettre の `AsyncSmtpTransport` を送信設定から組み立てる。
//!
//! - 暗号化トランスポート有効時は SMTPS（`Tls::Wrapper`）、無効時は STARTTLS を試みる
//!   （`Tls::Opportunistic`）
//! - TLS は 1.2 以上に固定し、証明書の検証には送信設定のホスト名を使う
//! - 接続・グリーティング・ソケットのタイムアウトは [`TransportTimeouts`]

use std::{error::Error as _, io, sync::Arc};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{
        Error as SmtpError,
        authentication::Credentials,
        client::{Tls, TlsParameters, TlsVersion},
    },
};
use recipebox_domain::{
    mail_settings::MailSettings,
    notification::{
        ConnectionFailureKind,
        ConnectionTestResult,
        EmailMessage,
        NotificationError,
    },
};
use uuid::Uuid;

use super::{MailTransport, TransportFactory, TransportTimeouts};
use crate::{
    mail_settings_provider::MailSettingsProvider,
    secret_codec::{SecretCodec, SecretError},
};

/// SMTP トランスポート
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` と差出人をラップする。
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from:      Mailbox,
    /// Message-ID のドメイン部
    id_domain: String,
}

impl SmtpMailTransport {
    /// 送信設定と復号済みパスワードからトランスポートを作成する
    pub fn new(
        settings: &MailSettings,
        password: String,
        timeouts: TransportTimeouts,
    ) -> Result<Self, NotificationError> {
        let tls_parameters = TlsParameters::builder(settings.host.clone())
            .set_min_tls_version(TlsVersion::Tlsv12)
            .build()
            .map_err(|e| NotificationError::Configuration(format!("TLS 設定エラー: {e}")))?;
        let tls = if settings.secure {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Opportunistic(tls_parameters)
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            .port(settings.port)
            .tls(tls)
            .credentials(Credentials::new(settings.username.clone(), password))
            .timeout(Some(timeouts.timeout))
            .build();

        let from: Mailbox = settings.from_mailbox().parse().map_err(|e| {
            NotificationError::Configuration(format!("送信元アドレス不正: {e}"))
        })?;
        let id_domain = from.email.domain().to_string();

        Ok(Self {
            transport,
            from,
            id_domain,
        })
    }

    fn build_message(&self, email: &EmailMessage, message_id: &str) -> Result<Message, NotificationError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| NotificationError::InvalidMessage(format!("宛先アドレス不正: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .message_id(Some(message_id.to_string()))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| NotificationError::InvalidMessage(format!("メッセージ構築失敗: {e}")))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send_email(&self, email: &EmailMessage) -> Result<String, NotificationError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.id_domain);
        let message = self.build_message(email, &message_id)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::SendFailed(format!("SMTP 送信失敗: {e}")))?;

        Ok(message_id)
    }
}

/// 送信設定プロバイダから SMTP トランスポートを生成するファクトリ
pub struct SmtpTransportFactory {
    settings: Arc<MailSettingsProvider>,
    codec:    SecretCodec,
    timeouts: TransportTimeouts,
}

impl SmtpTransportFactory {
    pub fn new(
        settings: Arc<MailSettingsProvider>,
        codec: SecretCodec,
        timeouts: TransportTimeouts,
    ) -> Self {
        Self {
            settings,
            codec,
            timeouts,
        }
    }

    fn build(&self, settings: &MailSettings) -> Result<SmtpMailTransport, NotificationError> {
        let password = self
            .codec
            .decrypt(&settings.encrypted_password)
            .map_err(secret_error_to_notification)?;
        SmtpMailTransport::new(settings, password, self.timeouts)
    }
}

#[async_trait]
impl TransportFactory for SmtpTransportFactory {
    fn create(&self) -> Result<Option<Arc<dyn MailTransport>>, NotificationError> {
        let settings = self.settings.get();
        if !settings.is_deliverable() {
            return Ok(None);
        }

        let transport = self.build(&settings)?;
        Ok(Some(Arc::new(transport)))
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn test_connection(&self) -> ConnectionTestResult {
        let settings = self.settings.get();
        if settings.host.is_empty() || settings.username.is_empty() || !settings.has_secret() {
            return ConnectionTestResult::failed(
                ConnectionFailureKind::Configuration,
                "ホスト、アカウント、パスワードを設定してください",
            );
        }

        let transport = match self.build(&settings) {
            Ok(transport) => transport,
            Err(e) => {
                return ConnectionTestResult::failed(ConnectionFailureKind::Configuration, e.to_string());
            }
        };

        match tokio::time::timeout(self.timeouts.timeout, transport.transport.test_connection())
            .await
        {
            Ok(Ok(true)) => ConnectionTestResult::ok(format!(
                "{}:{} への接続と認証に成功しました",
                settings.host, settings.port
            )),
            Ok(Ok(false)) => ConnectionTestResult::failed(
                ConnectionFailureKind::Protocol,
                "SMTP サーバーが接続テストに応答しませんでした",
            ),
            Ok(Err(e)) => {
                let kind = classify_smtp_error(&e);
                ConnectionTestResult::failed(kind, failure_message(kind, &e.to_string()))
            }
            Err(_) => ConnectionTestResult::failed(
                ConnectionFailureKind::Timeout,
                failure_message(
                    ConnectionFailureKind::Timeout,
                    &format!("{} 秒以内に応答がありません", self.timeouts.timeout.as_secs()),
                ),
            ),
        }
    }
}

fn secret_error_to_notification(error: SecretError) -> NotificationError {
    match error {
        SecretError::MissingPassphrase | SecretError::Encryption => {
            NotificationError::Configuration(error.to_string())
        }
        SecretError::Malformed(_) | SecretError::Decryption => {
            NotificationError::Decryption(error.to_string())
        }
    }
}

/// lettre のエラーを運用者向けの分類に変換する
fn classify_smtp_error(error: &SmtpError) -> ConnectionFailureKind {
    let status = error.status().map(|code| code.to_string());
    let timed_out = source_chain_timed_out(error);
    let rejected = error.is_permanent() || error.is_transient();
    classify_failure(status.as_deref(), timed_out, rejected)
}

fn source_chain_timed_out(error: &SmtpError) -> bool {
    let mut source = error.source();
    while let Some(e) = source {
        if e
            .downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::TimedOut)
        {
            return true;
        }
        source = e.source();
    }
    false
}

/// 応答コード・タイムアウト有無・SMTP 応答による拒否から失敗分類を決める
///
/// 530 / 534 / 535 は認証失敗、それ以外の SMTP 応答はプロトコルレベルの拒否、
/// 応答を得られなかったものは接続失敗として扱う。
fn classify_failure(
    status: Option<&str>,
    timed_out: bool,
    rejected: bool,
) -> ConnectionFailureKind {
    if matches!(status, Some("530" | "534" | "535")) {
        ConnectionFailureKind::Authentication
    } else if timed_out {
        ConnectionFailureKind::Timeout
    } else if rejected {
        ConnectionFailureKind::Protocol
    } else {
        ConnectionFailureKind::Network
    }
}

fn failure_message(kind: ConnectionFailureKind, detail: &str) -> String {
    let summary = match kind {
        ConnectionFailureKind::Authentication => {
            "認証に失敗しました。アカウントとパスワードを確認してください"
        }
        ConnectionFailureKind::Network => {
            "SMTP サーバーに接続できませんでした。ホスト名、ポート、暗号化設定を確認してください"
        }
        ConnectionFailureKind::Timeout => "SMTP サーバーへの接続がタイムアウトしました",
        ConnectionFailureKind::Protocol => "SMTP サーバーが要求を拒否しました",
        ConnectionFailureKind::Configuration => "送信設定に不備があります",
    };
    format!("{summary}（{detail}）")
}
