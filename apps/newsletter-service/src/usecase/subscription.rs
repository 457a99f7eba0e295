//! # 購読ライフサイクル
//!
//! ダブルオプトインによる購読登録・確認・解除を扱うユースケース。
//!
//! ## 設計方針
//!
//! - **状態遷移はエンティティ**: [`Subscriber`] のメソッドが遷移の可否を判定し、
//!   ここではトークン発行・永続化・メール送信を組み立てる
//! - **メール送信の失敗は伝播しない**: 購読者の行が正であり、確認メールなどの失敗で
//!   状態変更を巻き戻さない
//! - **送信は応答の後**: [`DeliveryMode::Background`] では別タスクで送信し、
//!   再試行の待機でリクエストを待たせない
//! - **確認と解除は条件付き更新**: 読み取りから書き込みまでの間に別のリクエストが
//!   遷移を済ませていた場合は書き込まず、メールも送らない

use std::sync::Arc;

use recipebox_domain::{
    clock::Clock,
    email_template::TemplateVariables,
    subscriber::{
        Subscriber,
        SubscriberEmail,
        SubscriberId,
        SubscriptionError,
        VerificationOutcome,
    },
};
use recipebox_infra::{repository::SubscriberRepository, token::generate_token};
use recipebox_shared::{event_log::event, log_business_event};
use serde::Serialize;

use super::mail_sender::MailSender;
use crate::{
    config::{DeliveryMode, SiteConfig},
    error::CoreError,
};

const SUBSCRIBED_MESSAGE: &str =
    "確認メールを送信しました。メール内のリンクから登録を完了してください";
const VERIFIED_MESSAGE: &str = "登録が完了しました。ニュースレターをお届けします";
const UNSUBSCRIBED_MESSAGE: &str = "ニュースレターの配信を停止しました";

/// 利用者向けの結果メッセージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionMessage {
    pub message: String,
}

impl SubscriptionMessage {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// 購読ライフサイクルのユースケース
pub struct SubscriptionUseCaseImpl {
    subscriber_repo: Arc<dyn SubscriberRepository>,
    mail_sender:     Arc<MailSender>,
    clock:           Arc<dyn Clock>,
    site:            SiteConfig,
    delivery_mode:   DeliveryMode,
}

impl SubscriptionUseCaseImpl {
    pub fn new(
        subscriber_repo: Arc<dyn SubscriberRepository>,
        mail_sender: Arc<MailSender>,
        clock: Arc<dyn Clock>,
        site: SiteConfig,
        delivery_mode: DeliveryMode,
    ) -> Self {
        Self {
            subscriber_repo,
            mail_sender,
            clock,
            site,
            delivery_mode,
        }
    }

    /// 購読を申し込む
    ///
    /// - 未登録: `Pending` で作成し、確認メールを送る
    /// - 未確認または解除済み: 検証トークンを再発行して `Pending` に戻し、確認メールを送る
    /// - 確認済みで有効: 拒否する
    pub async fn subscribe(&self, email: &str) -> Result<SubscriptionMessage, CoreError> {
        let email = SubscriberEmail::new(email)?;
        let now = self.clock.now();

        let (subscriber, action) = match self.subscriber_repo.find_by_email(&email).await? {
            None => {
                let subscriber = Subscriber::new(
                    SubscriberId::new(),
                    email,
                    generate_token(),
                    generate_token(),
                    now,
                );
                self.subscriber_repo
                    .insert(&subscriber)
                    .await
                    .map_err(|e| match e.as_conflict() {
                        // 同じアドレスの同時申し込み
                        Some(_) => CoreError::Conflict(
                            "このメールアドレスは既に登録されています".to_string(),
                        ),
                        None => CoreError::Database(e),
                    })?;
                (subscriber, event::action::SUBSCRIBED)
            }
            Some(existing) => {
                let subscriber = existing.resubscribe(generate_token(), generate_token(), now)?;
                self.subscriber_repo.update(&subscriber).await?;
                (subscriber, event::action::RESUBSCRIBED)
            }
        };

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = action,
            event.entity_type = event::entity_type::SUBSCRIBER,
            event.entity_id = %subscriber.id(),
            event.result = event::result::SUCCESS,
            "購読申し込みを受け付けました"
        );

        let verification_token = subscriber.verification_token().unwrap_or_default();
        let variables = TemplateVariables::Verification {
            email:            subscriber.email().to_string(),
            verification_url: self
                .site
                .absolute_url(&format!("/newsletter/verify/{verification_token}")),
        };
        self.dispatch(&subscriber, variables).await;

        Ok(SubscriptionMessage::new(SUBSCRIBED_MESSAGE))
    }

    /// 確認リンクのトークンで購読を有効にする
    ///
    /// 既に確認済みのトークンでも同じ成功メッセージを返す（二重クリック対策）。
    /// 同時に届いた場合もウェルカムメールは 1 通だけ送る。
    pub async fn verify(&self, token: &str) -> Result<SubscriptionMessage, CoreError> {
        let subscriber = self
            .subscriber_repo
            .find_by_verification_token(token)
            .await?
            .ok_or_else(|| CoreError::NotFound("確認リンクが無効です".to_string()))?;

        let verified = match subscriber.verify(self.clock.now())? {
            VerificationOutcome::Verified(verified) => verified,
            VerificationOutcome::AlreadyVerified => {
                return Ok(SubscriptionMessage::new(VERIFIED_MESSAGE));
            }
        };
        if !self.subscriber_repo.update_if_unverified(&verified).await? {
            // 別のリクエストが先に確認した
            return Ok(SubscriptionMessage::new(VERIFIED_MESSAGE));
        }

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = event::action::VERIFIED,
            event.entity_type = event::entity_type::SUBSCRIBER,
            event.entity_id = %verified.id(),
            event.result = event::result::SUCCESS,
            "購読を確認しました"
        );

        let variables = TemplateVariables::Welcome {
            email:           verified.email().to_string(),
            unsubscribe_url: self.unsubscribe_url(&verified),
            site_url:        self.site.base_url.clone(),
        };
        self.dispatch(&verified, variables).await;

        Ok(SubscriptionMessage::new(VERIFIED_MESSAGE))
    }

    /// 配信停止リンクのトークンで購読を解除する
    pub async fn unsubscribe_by_token(&self, token: &str) -> Result<SubscriptionMessage, CoreError> {
        let subscriber = self
            .subscriber_repo
            .find_by_unsubscribe_token(token)
            .await?
            .ok_or_else(|| CoreError::NotFound("配信停止リンクが無効です".to_string()))?;

        self.unsubscribe(subscriber).await
    }

    /// メールアドレスで購読を解除する
    pub async fn unsubscribe_by_email(&self, email: &str) -> Result<SubscriptionMessage, CoreError> {
        let email = SubscriberEmail::new(email)?;
        let subscriber = self
            .subscriber_repo
            .find_by_email(&email)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound("このメールアドレスは登録されていません".to_string())
            })?;

        self.unsubscribe(subscriber).await
    }

    async fn unsubscribe(&self, subscriber: Subscriber) -> Result<SubscriptionMessage, CoreError> {
        let unsubscribed = subscriber.unsubscribe(self.clock.now())?;
        if !self.subscriber_repo.update_if_subscribed(&unsubscribed).await? {
            return Err(SubscriptionError::AlreadyUnsubscribed.into());
        }

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = event::action::UNSUBSCRIBED,
            event.entity_type = event::entity_type::SUBSCRIBER,
            event.entity_id = %unsubscribed.id(),
            event.result = event::result::SUCCESS,
            "購読を解除しました"
        );

        let variables = TemplateVariables::UnsubscribeConfirmation {
            email:           unsubscribed.email().to_string(),
            resubscribe_url: self.site.absolute_url("/newsletter"),
        };
        self.dispatch(&unsubscribed, variables).await;

        Ok(SubscriptionMessage::new(UNSUBSCRIBED_MESSAGE))
    }

    fn unsubscribe_url(&self, subscriber: &Subscriber) -> String {
        let token = subscriber.unsubscribe_token().unwrap_or_default();
        self.site
            .absolute_url(&format!("/newsletter/unsubscribe/{token}"))
    }

    /// トランザクションメールを送る
    ///
    /// 失敗はログに残すだけで呼び出し元には返さない。
    async fn dispatch(&self, subscriber: &Subscriber, variables: TemplateVariables) {
        let sender = self.mail_sender.clone();
        let to = subscriber.email().to_string();
        let subscriber_id = subscriber.id().clone();
        let kind = variables.kind();

        let task = async move {
            let result = sender
                .send_by_kind(to, variables, Some(subscriber_id.clone()))
                .await;
            if !result.success {
                tracing::warn!(
                    subscriber_id = %subscriber_id,
                    kind = %kind,
                    error = result.error.as_deref().unwrap_or_default(),
                    "トランザクションメールを送信できませんでした"
                );
            }
        };

        match self.delivery_mode {
            DeliveryMode::Background => {
                tokio::spawn(task);
            }
            DeliveryMode::Inline => task.await,
        }
    }
}
