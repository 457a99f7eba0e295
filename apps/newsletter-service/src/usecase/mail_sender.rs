//! # メール送信
//!
//! テンプレートのレンダリング → トランスポート取得 → 送信（再試行付き）→ 配信ログ記録を
//! 統合するサービス。
//!
//! ## 設計方針
//!
//! - **エラーを返さない**: 送信の成否は [`SendResult`] で返し、呼び出し側が扱いを決める
//! - **送信不可は即失敗**: トランスポートが無い・作れない場合は再試行しない（設定の問題）
//! - **再試行は送信失敗のみ**: `base_delay × 試行回数` だけ待ってから再送する
//! - **ログは最終結果だけ**: 購読者 ID が指定された場合に、成功または再試行を使い切った
//!   失敗を 1 行だけ記録する

use std::sync::Arc;

use recipebox_domain::{
    clock::Clock,
    delivery_log::DeliveryLog,
    email_template::{EmailTemplate, EmailTemplateId, TemplateContext, TemplateVariables},
    notification::{EmailMessage, NotificationError, SendResult},
    subscriber::SubscriberId,
};
use recipebox_infra::{TransportFactory, repository::DeliveryLogRepository};
use recipebox_shared::{
    event_log::{error, event},
    log_business_event,
};

use super::{
    template_renderer::RenderedEmail,
    template_store::TemplateStore,
};
use crate::config::RetryPolicy;

/// 送信するメールの内容
#[derive(Debug, Clone)]
pub enum MailContent {
    /// レンダリング済み
    Rendered(RenderedEmail),
    /// テンプレート ID と変数から生成する
    Template {
        template_id: EmailTemplateId,
        context:     TemplateContext,
    },
}

/// 送信依頼
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub to:            String,
    pub content:       MailContent,
    /// 指定した場合のみ配信ログに記録する
    pub subscriber_id: Option<SubscriberId>,
}

/// メール送信サービス
pub struct MailSender {
    transport_factory: Arc<dyn TransportFactory>,
    template_store:    Arc<TemplateStore>,
    delivery_log_repo: Arc<dyn DeliveryLogRepository>,
    clock:             Arc<dyn Clock>,
    retry_policy:      RetryPolicy,
    site_name:         String,
}

impl MailSender {
    pub fn new(
        transport_factory: Arc<dyn TransportFactory>,
        template_store: Arc<TemplateStore>,
        delivery_log_repo: Arc<dyn DeliveryLogRepository>,
        clock: Arc<dyn Clock>,
        retry_policy: RetryPolicy,
        site_name: String,
    ) -> Self {
        Self {
            transport_factory,
            template_store,
            delivery_log_repo,
            clock,
            retry_policy,
            site_name,
        }
    }

    /// メールを 1 通送信する
    pub async fn send(&self, request: SendRequest) -> SendResult {
        let SendRequest {
            to,
            content,
            subscriber_id,
        } = request;

        let (rendered, template_id) = match content {
            MailContent::Rendered(rendered) => (rendered, None),
            MailContent::Template {
                template_id,
                context,
            } => match self.render_by_id(&template_id, &context).await {
                Ok(rendered) => (rendered, Some(template_id)),
                Err(e) => {
                    tracing::error!(
                        error.category = error::category::CONFIGURATION,
                        error.kind = error::kind::TEMPLATE,
                        template_id = %template_id,
                        error = %e,
                        "メールテンプレートのレンダリングに失敗"
                    );
                    return SendResult::failed(&e);
                }
            },
        };

        self.deliver(to, rendered, template_id, subscriber_id).await
    }

    /// 解決済みのテンプレートと種別ごとの変数で送信する
    ///
    /// `site_name` は自動で追加する。
    pub async fn send_template(
        &self,
        template: &EmailTemplate,
        to: String,
        variables: TemplateVariables,
        subscriber_id: Option<SubscriberId>,
    ) -> SendResult {
        let context = self.context_for(variables);
        match self.template_store.renderer().render_email(template, &context) {
            Ok(rendered) => {
                self.deliver(to, rendered, Some(template.id().clone()), subscriber_id)
                    .await
            }
            Err(e) => {
                tracing::error!(
                    error.category = error::category::CONFIGURATION,
                    error.kind = error::kind::TEMPLATE,
                    template_id = %template.id(),
                    error = %e,
                    "メールテンプレートのレンダリングに失敗"
                );
                SendResult::failed(&e)
            }
        }
    }

    /// 変数の種別に対応するテンプレートを引いて送信する
    ///
    /// テンプレートが無い場合は送信せずに失敗を返す。
    pub async fn send_by_kind(
        &self,
        to: String,
        variables: TemplateVariables,
        subscriber_id: Option<SubscriberId>,
    ) -> SendResult {
        let kind = variables.kind();
        let template = match self.template_store.get_by_kind(kind).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                let e = NotificationError::TemplateMissing(kind);
                tracing::warn!(
                    error.category = error::category::CONFIGURATION,
                    error.kind = error::kind::TEMPLATE,
                    error = %e,
                    "テンプレートが無いためメールを送信しません"
                );
                return SendResult::failed(&e);
            }
            Err(e) => {
                tracing::error!(
                    error.category = error::category::INFRASTRUCTURE,
                    error.kind = error::kind::DATABASE,
                    error = %e,
                    "メールテンプレートの取得に失敗"
                );
                return SendResult::failed(&NotificationError::TemplateFailed(e.to_string()));
            }
        };

        self.send_template(&template, to, variables, subscriber_id)
            .await
    }

    async fn render_by_id(
        &self,
        template_id: &EmailTemplateId,
        context: &TemplateContext,
    ) -> Result<RenderedEmail, NotificationError> {
        let template = self
            .template_store
            .get_template(template_id)
            .await
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        let mut context = context.clone();
        context
            .entry("site_name".to_string())
            .or_insert_with(|| self.site_name.clone());
        self.template_store
            .renderer()
            .render_email(&template, &context)
    }

    fn context_for(&self, variables: TemplateVariables) -> TemplateContext {
        let mut context = variables.into_context();
        context.insert("site_name".to_string(), self.site_name.clone());
        context
    }

    async fn deliver(
        &self,
        to: String,
        rendered: RenderedEmail,
        template_id: Option<EmailTemplateId>,
        subscriber_id: Option<SubscriberId>,
    ) -> SendResult {
        let transport = match self.transport_factory.create() {
            Ok(Some(transport)) => transport,
            Ok(None) => {
                tracing::warn!(recipient = %to, "メール送信が無効のため送信をスキップしました");
                return SendResult::failed(&NotificationError::TransportUnavailable);
            }
            Err(e) => {
                tracing::error!(
                    error.category = error::category::CONFIGURATION,
                    error.kind = error::kind::SECRET,
                    error = %e,
                    "メールトランスポートを作成できません"
                );
                return SendResult::failed(&e);
            }
        };

        let message = EmailMessage {
            to,
            subject: rendered.subject,
            html_body: rendered.html_body,
            text_body: rendered.text_body,
        };

        let mut failed_attempts = 0;
        let outcome = loop {
            match transport.send_email(&message).await {
                Ok(message_id) => break Ok(message_id),
                Err(e) if e.is_retryable() && failed_attempts < self.retry_policy.max_retries => {
                    failed_attempts += 1;
                    let delay = self.retry_policy.delay_after(failed_attempts);
                    tracing::warn!(
                        recipient = %message.to,
                        attempt = failed_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "メール送信に失敗したため再試行します"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        let now = self.clock.now();
        let (result, log) = match outcome {
            Ok(message_id) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_SENT,
                    event.entity_type = event::entity_type::DELIVERY_LOG,
                    event.result = event::result::SUCCESS,
                    notification.recipient = %message.to,
                    notification.message_id = %message_id,
                    "メール送信成功"
                );
                let log = DeliveryLog::sent(
                    subscriber_id,
                    message.to,
                    message.subject,
                    template_id,
                    now,
                );
                (SendResult::sent(message_id), log)
            }
            Err(e) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_FAILED,
                    event.entity_type = event::entity_type::DELIVERY_LOG,
                    event.result = event::result::FAILURE,
                    notification.recipient = %message.to,
                    notification.attempts = failed_attempts + 1,
                    error = %e,
                    "メール送信失敗"
                );
                let log = DeliveryLog::failed(
                    subscriber_id,
                    message.to,
                    message.subject,
                    template_id,
                    e.to_string(),
                    now,
                );
                (SendResult::failed(&e), log)
            }
        };

        if log.subscriber_id.is_none() {
            return result;
        }

        if let Err(e) = self.delivery_log_repo.insert(&log).await {
            tracing::error!(
                error.category = error::category::INFRASTRUCTURE,
                error.kind = error::kind::DELIVERY_LOG,
                error = %e,
                "配信ログの記録に失敗"
            );
        }
        result
    }
}
