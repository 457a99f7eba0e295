//! # キャンペーン配信
//!
//! レシピ公開イベントを受けて、有効な全購読者へ新着レシピのメールを配信する。
//!
//! ## 設計方針
//!
//! - **バッチ単位の並行送信**: 購読者を [`CampaignPolicy::batch_size`] 件ずつに分け、
//!   バッチ内は同時に送信する。バッチ間は [`CampaignPolicy::batch_pause`] だけ待つ
//! - **購読者ごとに独立**: 1 件の失敗は他の購読者や後続バッチに影響しない
//! - **集計はアトミックカウンタ**: 並行に完了する送信が成功数・失敗数を直接加算する
//! - **呼び出し元は待たない**: [`CampaignDispatcher::spawn`] は独立したタスクとして走らせる。
//!   実行中のキャンペーンを止める手段は持たない
//! - **開始時に送信設定を読み直す**: 設定変更は遅くとも次のキャンペーンから反映される

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use recipebox_domain::{
    email_template::{EmailTemplate, TemplateKind, TemplateVariables},
    notification::PublishedRecipe,
    subscriber::Subscriber,
};
use recipebox_infra::{MailSettingsProvider, repository::SubscriberRepository};
use recipebox_shared::{
    event_log::{error, event},
    log_business_event,
};
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};

use super::{mail_sender::MailSender, template_store::TemplateStore};
use crate::{
    config::{CampaignPolicy, SiteConfig},
    error::CoreError,
};

/// キャンペーンの終了理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignOutcome {
    /// 全バッチを送信した
    Completed,
    /// 配信対象の購読者がいない
    NoRecipients,
    /// 送信設定が無効または不完全
    MailDisabled,
    /// 新着レシピのテンプレートが無い
    TemplateMissing,
}

/// キャンペーンの集計結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub outcome:    CampaignOutcome,
    pub recipients: usize,
    pub sent:       usize,
    pub failed:     usize,
    pub batches:    usize,
}

impl CampaignSummary {
    fn skipped(outcome: CampaignOutcome, recipients: usize) -> Self {
        Self {
            outcome,
            recipients,
            sent: 0,
            failed: 0,
            batches: 0,
        }
    }
}

/// キャンペーン配信
pub struct CampaignDispatcher {
    subscriber_repo:   Arc<dyn SubscriberRepository>,
    template_store:    Arc<TemplateStore>,
    mail_sender:       Arc<MailSender>,
    settings_provider: Arc<MailSettingsProvider>,
    policy:            CampaignPolicy,
    site:              SiteConfig,
}

impl CampaignDispatcher {
    pub fn new(
        subscriber_repo: Arc<dyn SubscriberRepository>,
        template_store: Arc<TemplateStore>,
        mail_sender: Arc<MailSender>,
        settings_provider: Arc<MailSettingsProvider>,
        policy: CampaignPolicy,
        site: SiteConfig,
    ) -> Self {
        Self {
            subscriber_repo,
            template_store,
            mail_sender,
            settings_provider,
            policy,
            site,
        }
    }

    /// キャンペーンを独立したタスクとして開始する
    ///
    /// 結果はログとビジネスイベントにのみ残る。
    pub fn spawn(self: &Arc<Self>, recipe: PublishedRecipe) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let recipe_id = recipe.id.clone();
            if let Err(e) = dispatcher.run(recipe).await {
                tracing::error!(
                    recipe_id = %recipe_id,
                    error = %e,
                    "キャンペーン配信を開始できませんでした"
                );
            }
        })
    }

    /// キャンペーンを実行し、完了まで待つ
    ///
    /// 購読者一覧・送信設定・テンプレートの読み込み失敗だけがエラーになる。
    /// 個々の送信の失敗は集計に含める。
    pub async fn run(&self, recipe: PublishedRecipe) -> Result<CampaignSummary, CoreError> {
        let recipients = self.subscriber_repo.find_campaign_recipients().await?;
        if recipients.is_empty() {
            tracing::info!(recipe_id = %recipe.id, "配信対象の購読者がいないためキャンペーンをスキップします");
            return Ok(CampaignSummary::skipped(CampaignOutcome::NoRecipients, 0));
        }

        let settings = self.settings_provider.reload().await?;
        if !settings.is_deliverable() {
            tracing::info!(recipe_id = %recipe.id, "メール送信が無効のためキャンペーンをスキップします");
            return Ok(CampaignSummary::skipped(
                CampaignOutcome::MailDisabled,
                recipients.len(),
            ));
        }

        let Some(template) = self.template_store.get_by_kind(TemplateKind::NewContent).await? else {
            tracing::error!(
                error.category = error::category::CONFIGURATION,
                error.kind = error::kind::TEMPLATE,
                recipe_id = %recipe.id,
                "新着レシピのテンプレートが無いためキャンペーンを中止します"
            );
            return Ok(CampaignSummary::skipped(
                CampaignOutcome::TemplateMissing,
                recipients.len(),
            ));
        };

        log_business_event!(
            event.category = event::category::CAMPAIGN,
            event.action = event::action::CAMPAIGN_STARTED,
            event.entity_type = event::entity_type::RECIPE,
            event.entity_id = %recipe.id,
            event.result = event::result::SUCCESS,
            campaign.recipients = recipients.len(),
            "キャンペーン配信を開始します"
        );

        let summary = self.dispatch(&recipe, Arc::new(template), recipients).await;
        let result = if summary.failed == 0 {
            event::result::SUCCESS
        } else {
            event::result::FAILURE
        };

        log_business_event!(
            event.category = event::category::CAMPAIGN,
            event.action = event::action::CAMPAIGN_COMPLETED,
            event.entity_type = event::entity_type::RECIPE,
            event.entity_id = %recipe.id,
            event.result = result,
            campaign.recipients = summary.recipients,
            campaign.sent = summary.sent,
            campaign.failed = summary.failed,
            campaign.batches = summary.batches,
            "キャンペーン配信が完了しました"
        );

        Ok(summary)
    }

    async fn dispatch(
        &self,
        recipe: &PublishedRecipe,
        template: Arc<EmailTemplate>,
        recipients: Vec<Subscriber>,
    ) -> CampaignSummary {
        let sent = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let batch_size = self.policy.batch_size.max(1);
        let mut batches = 0;

        for (index, batch) in recipients.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.policy.batch_pause).await;
            }
            batches += 1;

            let mut tasks = JoinSet::new();
            for subscriber in batch {
                let Some(variables) = self.variables_for(recipe, subscriber) else {
                    tracing::warn!(
                        subscriber_id = %subscriber.id(),
                        "配信停止トークンが無いため送信をスキップしました"
                    );
                    failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                };

                let sender = Arc::clone(&self.mail_sender);
                let template = Arc::clone(&template);
                let sent = Arc::clone(&sent);
                let failed = Arc::clone(&failed);
                let to = subscriber.email().to_string();
                let subscriber_id = subscriber.id().clone();

                tasks.spawn(async move {
                    let result = sender
                        .send_template(&template, to, variables, Some(subscriber_id))
                        .await;
                    if result.success {
                        sent.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "キャンペーンの送信タスクが異常終了しました");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }

            tracing::debug!(
                recipe_id = %recipe.id,
                batch = index + 1,
                sent = sent.load(Ordering::Relaxed),
                failed = failed.load(Ordering::Relaxed),
                "バッチの送信が完了しました"
            );
        }

        CampaignSummary {
            outcome: CampaignOutcome::Completed,
            recipients: recipients.len(),
            sent: sent.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            batches,
        }
    }

    fn variables_for(
        &self,
        recipe: &PublishedRecipe,
        subscriber: &Subscriber,
    ) -> Option<TemplateVariables> {
        let unsubscribe_token = subscriber.unsubscribe_token()?;

        Some(TemplateVariables::NewContent {
            title:           recipe.title.clone(),
            description:     recipe.description.clone(),
            image_url:       recipe
                .image_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| self.site.absolute_url(url)),
            cooking_time:    recipe.cooking_time,
            servings:        recipe.servings,
            calories:        recipe.calories,
            recipe_url:      self.site.absolute_url(&format!("/recipes/{}", recipe.id)),
            unsubscribe_url: self
                .site
                .absolute_url(&format!("/newsletter/unsubscribe/{unsubscribe_token}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use recipebox_domain::delivery_log::DeliveryStatus;
    use recipebox_infra::repository::EmailTemplateRepository;

    use super::*;
    use crate::{config::CampaignPolicy, test_utils::NewsletterTestBuilder};

    fn recipe() -> PublishedRecipe {
        PublishedRecipe {
            id:           "42".to_string(),
            title:        "鶏の照り焼き".to_string(),
            description:  "<p>甘辛い<strong>照り</strong>が決め手</p>".to_string(),
            image_url:    Some("/uploads/teriyaki.jpg".to_string()),
            cooking_time: 25,
            servings:     2,
            calories:     480,
        }
    }

    #[tokio::test]
    async fn test_有効な購読者全員に新着レシピが届く() {
        let setup = NewsletterTestBuilder::new().build().await;
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            setup.subscriber_repo.add(setup.builder.active_subscriber(email));
        }

        let summary = setup.campaign.run(recipe()).await.unwrap();

        assert_eq!(
            summary,
            CampaignSummary {
                outcome:    CampaignOutcome::Completed,
                recipients: 3,
                sent:       3,
                failed:     0,
                batches:    1,
            }
        );
        assert_eq!(setup.transport.attempts().len(), 3);
        assert_eq!(setup.delivery_log_repo.all().len(), 3);
    }

    #[tokio::test]
    async fn test_1件の失敗は他の購読者に影響しない() {
        let setup = NewsletterTestBuilder::new().build().await;
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            setup.subscriber_repo.add(setup.builder.active_subscriber(email));
        }
        setup.transport.fail_for("b@example.com");

        let summary = setup.campaign.run(recipe()).await.unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(setup.transport.attempts_to("a@example.com"), 1);
        assert_eq!(setup.transport.attempts_to("c@example.com"), 1);
        // 失敗した購読者は再試行を使い切る
        assert_eq!(setup.transport.attempts_to("b@example.com"), 4);
        let failed_logs: Vec<_> = setup
            .delivery_log_repo
            .all()
            .into_iter()
            .filter(|log| log.status == DeliveryStatus::Failed)
            .collect();
        assert_eq!(failed_logs.len(), 1);
        assert_eq!(failed_logs[0].recipient, "b@example.com");
    }

    #[tokio::test]
    async fn test_購読者はバッチサイズごとに分割される() {
        let setup = NewsletterTestBuilder::new()
            .with_campaign_policy(CampaignPolicy {
                batch_size:  2,
                batch_pause: std::time::Duration::ZERO,
            })
            .build()
            .await;
        for i in 0..5 {
            setup
                .subscriber_repo
                .add(setup.builder.active_subscriber(&format!("user{i}@example.com")));
        }

        let summary = setup.campaign.run(recipe()).await.unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.sent, 5);
    }

    #[tokio::test]
    async fn test_未確認や解除済みの購読者には送らない() {
        let setup = NewsletterTestBuilder::new().build().await;
        setup.subscriber_repo.add(setup.builder.active_subscriber("active@example.com"));
        setup.subscriber_repo.add(setup.builder.pending_subscriber("pending@example.com"));
        setup.subscriber_repo.add(
            setup
                .builder
                .active_subscriber("gone@example.com")
                .unsubscribe(setup.builder.now())
                .unwrap(),
        );

        let summary = setup.campaign.run(recipe()).await.unwrap();

        assert_eq!(summary.recipients, 1);
        let sent = setup.transport.attempts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "active@example.com");
    }

    #[tokio::test]
    async fn test_購読者ごとのリンクと絶対urlの画像が埋め込まれる() {
        let setup = NewsletterTestBuilder::new().build().await;
        let subscriber = setup.builder.active_subscriber("a@example.com");
        let token = subscriber.unsubscribe_token().unwrap().to_string();
        setup.subscriber_repo.add(subscriber);

        setup.campaign.run(recipe()).await.unwrap();

        let sent = &setup.transport.attempts()[0];
        assert_eq!(sent.subject, "【Recipebox】新着レシピ: 鶏の照り焼き");
        // HTML 本文の URL はエスケープされて埋め込まれる
        assert!(
            sent.html_body
                .contains(&tera::escape_html("https://recipes.example.com/recipes/42"))
        );
        assert!(sent.html_body.contains(&tera::escape_html(&format!(
            "https://recipes.example.com/newsletter/unsubscribe/{token}"
        ))));
        assert!(
            sent.html_body
                .contains(&tera::escape_html("https://recipes.example.com/uploads/teriyaki.jpg"))
        );
        assert!(sent.html_body.contains("<strong>照り</strong>"));
        assert!(sent.html_body.contains("25 分"));
        assert!(sent.html_body.contains("480 kcal"));
    }

    #[tokio::test]
    async fn test_画像が無ければ画像ブロックを出力しない() {
        let setup = NewsletterTestBuilder::new().build().await;
        setup.subscriber_repo.add(setup.builder.active_subscriber("a@example.com"));

        setup
            .campaign
            .run(PublishedRecipe {
                image_url: None,
                ..recipe()
            })
            .await
            .unwrap();

        assert!(!setup.transport.attempts()[0].html_body.contains("<img"));
    }

    #[tokio::test]
    async fn test_購読者がいなければ何もしない() {
        let setup = NewsletterTestBuilder::new().build().await;

        let summary = setup.campaign.run(recipe()).await.unwrap();

        assert_eq!(summary.outcome, CampaignOutcome::NoRecipients);
        assert!(setup.transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_送信設定が無効なら何もしない() {
        let setup = NewsletterTestBuilder::new().without_mail_settings().build().await;
        setup.subscriber_repo.add(setup.builder.active_subscriber("a@example.com"));

        let summary = setup.campaign.run(recipe()).await.unwrap();

        assert_eq!(summary.outcome, CampaignOutcome::MailDisabled);
        assert_eq!(setup.transport_factory.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_テンプレートが無ければ1通も送らずに中止する() {
        let setup = NewsletterTestBuilder::new().build().await;
        setup.subscriber_repo.add(setup.builder.active_subscriber("a@example.com"));
        let templates = setup.template_repo.all();
        for template in templates.iter().filter(|t| t.kind() == TemplateKind::NewContent) {
            setup.template_repo.delete(template.id()).await.unwrap();
        }

        let summary = setup.campaign.run(recipe()).await.unwrap();

        assert_eq!(summary.outcome, CampaignOutcome::TemplateMissing);
        assert!(setup.transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_開始時に送信設定を読み直す() {
        let setup = NewsletterTestBuilder::new().without_mail_settings().build().await;
        setup.subscriber_repo.add(setup.builder.active_subscriber("a@example.com"));
        setup.settings_repo.set(setup.builder.deliverable_settings());

        let summary = setup.campaign.run(recipe()).await.unwrap();

        assert_eq!(summary.outcome, CampaignOutcome::Completed);
        assert!(setup.settings_provider.get().is_deliverable());
    }

    #[tokio::test]
    async fn test_spawnは独立したタスクで最後まで配信する() {
        let setup = NewsletterTestBuilder::new().build().await;
        setup.subscriber_repo.add(setup.builder.active_subscriber("a@example.com"));

        setup.campaign.spawn(recipe()).await.unwrap();

        assert_eq!(setup.transport.attempts().len(), 1);
    }
}
