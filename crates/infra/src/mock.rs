//! # テスト用モック
//!
//! ユースケーステストで使用するインメモリのリポジトリとトランスポート。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! recipebox-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recipebox_domain::{
    delivery_log::{DeliveryLog, DeliveryLogFilter, DeliveryStats, DeliveryStatus},
    email_template::{EmailTemplate, EmailTemplateId, TemplateKind},
    mail_settings::MailSettings,
    notification::{ConnectionTestResult, EmailMessage, NotificationError},
    subscriber::{Subscriber, SubscriberEmail, SubscriberId, SubscriberStatus},
};

use crate::{
    error::InfraError,
    mail::{MailTransport, TransportFactory},
    repository::{
        DeliveryLogRepository,
        EmailTemplateRepository,
        MailSettingsRepository,
        SubscriberCounts,
        SubscriberRepository,
    },
};

fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or_default();
    let limit = usize::try_from(limit).unwrap_or_default();
    items.iter().skip(offset).take(limit).cloned().collect()
}

// ===== MockSubscriberRepository =====

#[derive(Clone, Default)]
pub struct MockSubscriberRepository {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl MockSubscriberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscriber: Subscriber) {
        self.subscribers.lock().unwrap().push(subscriber);
    }

    /// 保存されている全購読者のスナップショット
    pub fn all(&self) -> Vec<Subscriber> {
        self.subscribers.lock().unwrap().clone()
    }

    fn find(&self, predicate: impl Fn(&Subscriber) -> bool) -> Option<Subscriber> {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .find(|s| predicate(s))
            .cloned()
    }

    /// 保存済みの行が `guard` を満たす場合だけ置き換える（判定と書き込みは同じロック内）
    fn replace_if(&self, subscriber: &Subscriber, guard: impl Fn(&Subscriber) -> bool) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers
            .iter_mut()
            .find(|s| s.id() == subscriber.id() && guard(s))
        {
            Some(existing) => {
                *existing = subscriber.clone();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SubscriberRepository for MockSubscriberRepository {
    async fn find_by_id(&self, id: &SubscriberId) -> Result<Option<Subscriber>, InfraError> {
        Ok(self.find(|s| s.id() == id))
    }

    async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, InfraError> {
        Ok(self.find(|s| s.email() == email))
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, InfraError> {
        Ok(self.find(|s| s.verification_token() == Some(token)))
    }

    async fn find_by_unsubscribe_token(
        &self,
        token: &str,
    ) -> Result<Option<Subscriber>, InfraError> {
        Ok(self.find(|s| s.unsubscribe_token() == Some(token)))
    }

    async fn insert(&self, subscriber: &Subscriber) -> Result<(), InfraError> {
        let mut subscribers = self.subscribers.lock().unwrap();
        if subscribers.iter().any(|s| s.email() == subscriber.email()) {
            return Err(InfraError::conflict(
                "Subscriber",
                subscriber.email().as_str(),
            ));
        }
        subscribers.push(subscriber.clone());
        Ok(())
    }

    async fn update(&self, subscriber: &Subscriber) -> Result<(), InfraError> {
        self.replace_if(subscriber, |_| true);
        Ok(())
    }

    async fn update_if_unverified(&self, subscriber: &Subscriber) -> Result<bool, InfraError> {
        Ok(self.replace_if(subscriber, |stored| !stored.verified()))
    }

    async fn update_if_subscribed(&self, subscriber: &Subscriber) -> Result<bool, InfraError> {
        Ok(self.replace_if(subscriber, |stored| {
            stored.status() != SubscriberStatus::Unsubscribed
        }))
    }

    async fn delete(&self, id: &SubscriberId) -> Result<bool, InfraError> {
        let mut subscribers = self.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|s| s.id() != id);
        Ok(subscribers.len() < before)
    }

    async fn find_campaign_recipients(&self) -> Result<Vec<Subscriber>, InfraError> {
        Ok(self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_campaign_recipient())
            .cloned()
            .collect())
    }

    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> Result<u64, InfraError> {
        let mut subscribers = self.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|s| s.verified() || s.subscribed_date() >= cutoff);
        Ok((before - subscribers.len()) as u64)
    }

    async fn count_by_status(&self) -> Result<SubscriberCounts, InfraError> {
        let subscribers = self.subscribers.lock().unwrap();
        let count = |status: SubscriberStatus| {
            subscribers.iter().filter(|s| s.status() == status).count() as u64
        };
        Ok(SubscriberCounts {
            total:        subscribers.len() as u64,
            pending:      count(SubscriberStatus::Pending),
            active:       count(SubscriberStatus::Active),
            unsubscribed: count(SubscriberStatus::Unsubscribed),
            verified:     subscribers.iter().filter(|s| s.verified()).count() as u64,
        })
    }

    async fn list(
        &self,
        status: Option<SubscriberStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Subscriber>, u64), InfraError> {
        let mut matched: Vec<Subscriber> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|s| status.is_none_or(|status| s.status() == status))
            .cloned()
            .collect();
        matched.sort_by_key(|s| std::cmp::Reverse(s.created_at()));
        let total = matched.len() as u64;
        Ok((page(&matched, limit, offset), total))
    }
}

// ===== MockEmailTemplateRepository =====

#[derive(Clone, Default)]
pub struct MockEmailTemplateRepository {
    templates: Arc<Mutex<Vec<EmailTemplate>>>,
}

impl MockEmailTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, template: EmailTemplate) {
        self.templates.lock().unwrap().push(template);
    }

    /// 保存されている全テンプレートのスナップショット
    pub fn all(&self) -> Vec<EmailTemplate> {
        self.templates.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTemplateRepository for MockEmailTemplateRepository {
    async fn find_by_id(
        &self,
        id: &EmailTemplateId,
    ) -> Result<Option<EmailTemplate>, InfraError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id() == id)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<EmailTemplate>, InfraError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.name() == name)
            .cloned())
    }

    async fn find_by_kind(&self, kind: TemplateKind) -> Result<Vec<EmailTemplate>, InfraError> {
        let mut matched: Vec<EmailTemplate> = self
            .templates
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect();
        matched.sort_by_key(|t| !t.is_default());
        Ok(matched)
    }

    async fn find_all(&self) -> Result<Vec<EmailTemplate>, InfraError> {
        Ok(self.all())
    }

    async fn insert(&self, template: &EmailTemplate) -> Result<(), InfraError> {
        let mut templates = self.templates.lock().unwrap();
        if templates.iter().any(|t| t.name() == template.name()) {
            return Err(InfraError::conflict("EmailTemplate", template.name()));
        }
        templates.push(template.clone());
        Ok(())
    }

    async fn update(&self, template: &EmailTemplate) -> Result<(), InfraError> {
        let mut templates = self.templates.lock().unwrap();
        if templates
            .iter()
            .any(|t| t.name() == template.name() && t.id() != template.id())
        {
            return Err(InfraError::conflict("EmailTemplate", template.name()));
        }
        if let Some(existing) = templates.iter_mut().find(|t| t.id() == template.id()) {
            let is_default = existing.is_default();
            *existing = template.clone().with_default(is_default, template.updated_at());
        }
        Ok(())
    }

    async fn delete(&self, id: &EmailTemplateId) -> Result<bool, InfraError> {
        let mut templates = self.templates.lock().unwrap();
        let before = templates.len();
        templates.retain(|t| t.id() != id);
        Ok(templates.len() < before)
    }

    async fn set_default(
        &self,
        kind: TemplateKind,
        id: &EmailTemplateId,
    ) -> Result<bool, InfraError> {
        let mut templates = self.templates.lock().unwrap();
        if !templates.iter().any(|t| t.id() == id && t.kind() == kind) {
            return Ok(false);
        }
        let now = Utc::now();
        let updated = templates
            .drain(..)
            .map(|t| {
                if t.kind() != kind {
                    t
                } else {
                    let is_target = t.id() == id;
                    t.with_default(is_target, now)
                }
            })
            .collect();
        *templates = updated;
        Ok(true)
    }
}

// ===== MockMailSettingsRepository =====

#[derive(Clone, Default)]
pub struct MockMailSettingsRepository {
    settings: Arc<Mutex<Option<MailSettings>>>,
}

impl MockMailSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存されている設定を直接置き換える
    pub fn set(&self, settings: MailSettings) {
        *self.settings.lock().unwrap() = Some(settings);
    }
}

#[async_trait]
impl MailSettingsRepository for MockMailSettingsRepository {
    async fn get(&self) -> Result<Option<MailSettings>, InfraError> {
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn upsert(&self, settings: &MailSettings) -> Result<(), InfraError> {
        let saved = MailSettings {
            updated_at: Some(Utc::now()),
            ..settings.clone()
        };
        *self.settings.lock().unwrap() = Some(saved);
        Ok(())
    }
}

// ===== MockDeliveryLogRepository =====

#[derive(Clone, Default)]
pub struct MockDeliveryLogRepository {
    logs: Arc<Mutex<Vec<DeliveryLog>>>,
}

impl MockDeliveryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 記録された全ログのスナップショット
    pub fn all(&self) -> Vec<DeliveryLog> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryLogRepository for MockDeliveryLogRepository {
    async fn insert(&self, log: &DeliveryLog) -> Result<(), InfraError> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn list(
        &self,
        filter: &DeliveryLogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DeliveryLog>, u64), InfraError> {
        let mut matched: Vec<DeliveryLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        matched.sort_by_key(|log| std::cmp::Reverse(log.created_at));
        let total = matched.len() as u64;
        Ok((page(&matched, limit, offset), total))
    }

    async fn stats(&self) -> Result<DeliveryStats, InfraError> {
        let logs = self.logs.lock().unwrap();
        let count = |status: DeliveryStatus| logs.iter().filter(|l| l.status == status).count() as u64;
        Ok(DeliveryStats::from_counts(
            count(DeliveryStatus::Sent),
            count(DeliveryStatus::Failed),
            count(DeliveryStatus::Pending),
        ))
    }
}

// ===== MockMailTransport =====

/// 送信を記録し、指定に応じて失敗するトランスポート
#[derive(Clone, Default)]
pub struct MockMailTransport {
    attempts:           Arc<Mutex<Vec<EmailMessage>>>,
    failing_recipients: Arc<Mutex<HashSet<String>>>,
    remaining_failures: Arc<AtomicUsize>,
    always_fail:        Arc<Mutex<bool>>,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定した宛先への送信を常に失敗させる
    pub fn fail_for(&self, recipient: &str) {
        self.failing_recipients
            .lock()
            .unwrap()
            .insert(recipient.to_string());
    }

    /// 最初の `times` 回の送信を失敗させる
    pub fn fail_times(&self, times: usize) {
        self.remaining_failures.store(times, Ordering::SeqCst);
    }

    /// すべての送信を失敗させる
    pub fn always_fail(&self) {
        *self.always_fail.lock().unwrap() = true;
    }

    /// 送信試行（失敗を含む）の記録
    pub fn attempts(&self) -> Vec<EmailMessage> {
        self.attempts.lock().unwrap().clone()
    }

    /// 指定した宛先への送信試行回数
    pub fn attempts_to(&self, recipient: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to == recipient)
            .count()
    }

    fn should_fail(&self, recipient: &str) -> bool {
        if *self.always_fail.lock().unwrap() {
            return true;
        }
        if self.failing_recipients.lock().unwrap().contains(recipient) {
            return true;
        }
        self.remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    async fn send_email(&self, email: &EmailMessage) -> Result<String, NotificationError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(email.clone());
            attempts.len()
        };

        if self.should_fail(&email.to) {
            return Err(NotificationError::SendFailed(format!(
                "mock: {} への送信に失敗",
                email.to
            )));
        }

        Ok(format!("<mock-{attempt}@recipebox.test>"))
    }
}

// ===== MockTransportFactory =====

enum FactoryMode {
    Available,
    Unavailable,
    Failing(NotificationError),
}

/// [`MockMailTransport`] を返すトランスポートファクトリ
#[derive(Clone)]
pub struct MockTransportFactory {
    transport:       MockMailTransport,
    mode:            Arc<Mutex<FactoryMode>>,
    create_calls:    Arc<AtomicUsize>,
    connection_test: Arc<Mutex<ConnectionTestResult>>,
}

impl MockTransportFactory {
    /// 送信可能な状態で作成する
    pub fn new(transport: MockMailTransport) -> Self {
        Self {
            transport,
            mode: Arc::new(Mutex::new(FactoryMode::Available)),
            create_calls: Arc::new(AtomicUsize::new(0)),
            connection_test: Arc::new(Mutex::new(ConnectionTestResult::ok("mock: 接続成功"))),
        }
    }

    /// 送信設定が無効な状態（`create` が `None` を返す）にする
    pub fn set_unavailable(&self) {
        *self.mode.lock().unwrap() = FactoryMode::Unavailable;
    }

    /// `create` がエラーを返す状態にする
    pub fn set_failing(&self, error: NotificationError) {
        *self.mode.lock().unwrap() = FactoryMode::Failing(error);
    }

    /// 送信可能な状態に戻す
    pub fn set_available(&self) {
        *self.mode.lock().unwrap() = FactoryMode::Available;
    }

    /// 接続テストの結果を指定する
    pub fn set_connection_test_result(&self, result: ConnectionTestResult) {
        *self.connection_test.lock().unwrap() = result;
    }

    pub fn transport(&self) -> &MockMailTransport {
        &self.transport
    }

    /// `create` の呼び出し回数
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    fn create(&self) -> Result<Option<Arc<dyn MailTransport>>, NotificationError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.mode.lock().unwrap() {
            FactoryMode::Available => Ok(Some(Arc::new(self.transport.clone()))),
            FactoryMode::Unavailable => Ok(None),
            FactoryMode::Failing(error) => Err(error.clone()),
        }
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        self.connection_test.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use recipebox_domain::subscriber::VerificationOutcome;

    use super::*;

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to:        to.to_string(),
            subject:   "件名".to_string(),
            html_body: "<p>本文</p>".to_string(),
            text_body: "本文".to_string(),
        }
    }

    #[tokio::test]
    async fn test_条件付き更新は保存済みの行が条件を満たすときだけ書き込む() {
        let now = Utc::now();
        let pending = Subscriber::new(
            SubscriberId::new(),
            SubscriberEmail::new("a@example.com").unwrap(),
            "verify".to_string(),
            "unsub".to_string(),
            now,
        );
        let sut = MockSubscriberRepository::new();
        sut.add(pending.clone());
        let Ok(VerificationOutcome::Verified(verified)) = pending.verify(now) else {
            panic!("未検証の購読者は検証できる");
        };

        assert!(sut.update_if_unverified(&verified).await.unwrap());
        assert!(!sut.update_if_unverified(&verified).await.unwrap());

        let unsubscribed = verified.unsubscribe(now).unwrap();
        assert!(sut.update_if_subscribed(&unsubscribed).await.unwrap());
        assert!(!sut.update_if_subscribed(&unsubscribed).await.unwrap());
        assert_eq!(sut.all(), vec![unsubscribed]);
    }

    #[tokio::test]
    async fn test_fail_timesは指定回数だけ失敗する() {
        let sut = MockMailTransport::new();
        sut.fail_times(2);

        assert!(sut.send_email(&message("a@example.com")).await.is_err());
        assert!(sut.send_email(&message("a@example.com")).await.is_err());
        assert!(sut.send_email(&message("a@example.com")).await.is_ok());
        assert_eq!(sut.attempts_to("a@example.com"), 3);
    }

    #[tokio::test]
    async fn test_fail_forは指定した宛先だけ失敗する() {
        let sut = MockMailTransport::new();
        sut.fail_for("b@example.com");

        assert!(sut.send_email(&message("a@example.com")).await.is_ok());
        assert!(sut.send_email(&message("b@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_ファクトリは状態に応じてトランスポートを返す() {
        let sut = MockTransportFactory::new(MockMailTransport::new());

        assert!(sut.create().unwrap().is_some());
        sut.set_unavailable();
        assert!(sut.create().unwrap().is_none());
        sut.set_failing(NotificationError::Decryption("x".to_string()));
        assert!(sut.create().is_err());
        assert_eq!(sut.create_calls(), 3);
    }
}
