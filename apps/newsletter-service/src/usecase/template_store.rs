//! # テンプレートストア
//!
//! 種別ごとのメールテンプレートの取得・管理と、組み込みテンプレートの投入を担当する。
//!
//! ## 設計方針
//!
//! - **組み込みテンプレートは `include_str!` で埋め込む**: 起動のたびに
//!   [`TemplateStore::ensure_seeded`] を呼び、同名の行が無いものだけを投入する
//! - **既定テンプレートの切り替えはリポジトリの 1 トランザクション**
//! - **既定テンプレートは削除できない**: 組み込みの 4 件はすべて既定として投入される

use std::sync::Arc;

use recipebox_domain::{
    clock::Clock,
    email_template::{EmailTemplate, EmailTemplateId, TemplateContext, TemplateKind},
};
use recipebox_infra::{InfraError, repository::EmailTemplateRepository};

use super::template_renderer::{RenderedEmail, TemplateRenderer};
use crate::error::CoreError;

/// 組み込みテンプレートの定義
pub struct BuiltinTemplate {
    pub name:      &'static str,
    pub kind:      TemplateKind,
    pub subject:   &'static str,
    pub body_html: &'static str,
    pub body_text: &'static str,
}

/// 組み込みテンプレート（種別ごとに 1 件）
pub const BUILTIN_TEMPLATES: [BuiltinTemplate; 4] = [
    BuiltinTemplate {
        name:      "verification-default",
        kind:      TemplateKind::Verification,
        subject:   "【{{site_name}}】ニュースレター登録の確認",
        body_html: include_str!("../../templates/newsletter/verification.html"),
        body_text: include_str!("../../templates/newsletter/verification.txt"),
    },
    BuiltinTemplate {
        name:      "welcome-default",
        kind:      TemplateKind::Welcome,
        subject:   "【{{site_name}}】ニュースレターへようこそ",
        body_html: include_str!("../../templates/newsletter/welcome.html"),
        body_text: include_str!("../../templates/newsletter/welcome.txt"),
    },
    BuiltinTemplate {
        name:      "new-recipe-default",
        kind:      TemplateKind::NewContent,
        subject:   "【{{site_name}}】新着レシピ: {{title}}",
        body_html: include_str!("../../templates/newsletter/new_content.html"),
        body_text: include_str!("../../templates/newsletter/new_content.txt"),
    },
    BuiltinTemplate {
        name:      "unsubscribe-confirmation-default",
        kind:      TemplateKind::UnsubscribeConfirmation,
        subject:   "【{{site_name}}】ニュースレターの配信を停止しました",
        body_html: include_str!("../../templates/newsletter/unsubscribe_confirmation.html"),
        body_text: include_str!("../../templates/newsletter/unsubscribe_confirmation.txt"),
    },
];

/// テンプレート作成の入力
#[derive(Debug, Clone)]
pub struct CreateTemplateInput {
    pub name:       String,
    pub kind:       TemplateKind,
    pub subject:    String,
    pub body_html:  String,
    pub body_text:  String,
    /// 省略時は種別の標準の変数名
    pub variables:  Option<Vec<String>>,
    pub is_default: bool,
}

/// テンプレート更新の入力（指定したフィールドだけ更新する）
#[derive(Debug, Clone, Default)]
pub struct UpdateTemplateInput {
    pub name:      Option<String>,
    pub subject:   Option<String>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub variables: Option<Vec<String>>,
}

/// テンプレートストア
pub struct TemplateStore {
    repository: Arc<dyn EmailTemplateRepository>,
    renderer:   TemplateRenderer,
    clock:      Arc<dyn Clock>,
}

impl TemplateStore {
    pub fn new(
        repository: Arc<dyn EmailTemplateRepository>,
        renderer: TemplateRenderer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            renderer,
            clock,
        }
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    /// 組み込みテンプレートのうち、同名の行が無いものを投入する
    ///
    /// 何度呼んでもよい。既定テンプレートが既にある種別では既定にしない。
    /// 投入した件数を返す。
    pub async fn ensure_seeded(&self) -> Result<usize, CoreError> {
        let now = self.clock.now();
        let mut inserted = 0;

        for builtin in &BUILTIN_TEMPLATES {
            if self.repository.find_by_name(builtin.name).await?.is_some() {
                continue;
            }

            let has_default = self
                .repository
                .find_by_kind(builtin.kind)
                .await?
                .iter()
                .any(EmailTemplate::is_default);

            let template = EmailTemplate::new(
                EmailTemplateId::new(),
                builtin.name.to_string(),
                builtin.kind,
                builtin.subject.to_string(),
                builtin.body_html.to_string(),
                builtin.body_text.to_string(),
                default_variables(builtin.kind),
                !has_default,
                now,
            );

            match self.repository.insert(&template).await {
                Ok(()) => inserted += 1,
                // 複数プロセスが同時に起動した場合
                Err(e) if e.as_conflict().is_some() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if inserted > 0 {
            tracing::info!(inserted, "組み込みメールテンプレートを投入しました");
        }
        Ok(inserted)
    }

    /// 種別のテンプレートを取得する
    ///
    /// 既定テンプレートを優先し、無ければ同じ種別の任意の 1 件を返す。
    /// 種別のテンプレートが 1 件も無ければ `None`。
    pub async fn get_by_kind(&self, kind: TemplateKind) -> Result<Option<EmailTemplate>, CoreError> {
        let templates = self.repository.find_by_kind(kind).await?;
        let found = templates
            .iter()
            .find(|t| t.is_default())
            .or_else(|| templates.first())
            .cloned();
        Ok(found)
    }

    pub async fn list_templates(&self) -> Result<Vec<EmailTemplate>, CoreError> {
        Ok(self.repository.find_all().await?)
    }

    pub async fn get_template(&self, id: &EmailTemplateId) -> Result<EmailTemplate, CoreError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound("テンプレートが見つかりません".to_string()))
    }

    /// テンプレートを作成する
    ///
    /// 1. 名前の重複を確認
    /// 2. 件名・本文がレンダリングできることを確認
    /// 3. DB に挿入し、既定指定があれば同じ種別の既定を切り替える
    pub async fn create_template(
        &self,
        input: CreateTemplateInput,
    ) -> Result<EmailTemplate, CoreError> {
        let name = validate_name(&input.name)?;
        if self.repository.find_by_name(&name).await?.is_some() {
            return Err(duplicate_name(&name));
        }
        self.validate_content(&input.subject, &input.body_html, &input.body_text)?;

        let template = EmailTemplate::new(
            EmailTemplateId::new(),
            name,
            input.kind,
            input.subject,
            input.body_html,
            input.body_text,
            input
                .variables
                .unwrap_or_else(|| default_variables(input.kind)),
            false,
            self.clock.now(),
        );
        self.repository
            .insert(&template)
            .await
            .map_err(|e| map_conflict(e, template.name()))?;

        if input.is_default {
            return self.set_default(template.id()).await;
        }
        Ok(template)
    }

    /// テンプレートを更新する
    ///
    /// 種別と既定フラグは変更しない（既定の切り替えは [`Self::set_default`]）。
    pub async fn update_template(
        &self,
        id: &EmailTemplateId,
        input: UpdateTemplateInput,
    ) -> Result<EmailTemplate, CoreError> {
        let current = self.get_template(id).await?;
        let now = self.clock.now();

        let mut template = current;
        if let Some(name) = input.name {
            let name = validate_name(&name)?;
            if name != template.name() {
                if self.repository.find_by_name(&name).await?.is_some() {
                    return Err(duplicate_name(&name));
                }
                template = template.with_name(name, now);
            }
        }

        if input.subject.is_some() || input.body_html.is_some() || input.body_text.is_some() {
            let subject = input
                .subject
                .unwrap_or_else(|| template.subject().to_string());
            let body_html = input
                .body_html
                .unwrap_or_else(|| template.body_html().to_string());
            let body_text = input
                .body_text
                .unwrap_or_else(|| template.body_text().to_string());
            self.validate_content(&subject, &body_html, &body_text)?;
            template = template.with_content(subject, body_html, body_text, now);
        }

        if let Some(variables) = input.variables {
            template = template.with_variables(variables, now);
        }

        self.repository
            .update(&template)
            .await
            .map_err(|e| map_conflict(e, template.name()))?;
        Ok(template)
    }

    /// テンプレートを削除する
    ///
    /// 既定テンプレートは削除できない。先に別のテンプレートを既定にする。
    pub async fn delete_template(&self, id: &EmailTemplateId) -> Result<(), CoreError> {
        let template = self.get_template(id).await?;
        if template.is_default() {
            return Err(CoreError::BadRequest(
                "既定のテンプレートは削除できません。別のテンプレートを既定に設定してください"
                    .to_string(),
            ));
        }

        if !self.repository.delete(id).await? {
            return Err(CoreError::NotFound(
                "テンプレートが見つかりません".to_string(),
            ));
        }
        Ok(())
    }

    /// テンプレートを種別の既定にする
    ///
    /// 同じ種別の他のテンプレートの既定フラグは同時に外れる。
    pub async fn set_default(&self, id: &EmailTemplateId) -> Result<EmailTemplate, CoreError> {
        let template = self.get_template(id).await?;
        if !self.repository.set_default(template.kind(), id).await? {
            return Err(CoreError::NotFound(
                "テンプレートが見つかりません".to_string(),
            ));
        }

        tracing::info!(
            template_id = %id,
            kind = %template.kind(),
            "既定のメールテンプレートを変更しました"
        );
        self.get_template(id).await
    }

    /// 送信せずにテンプレートをレンダリングする
    ///
    /// `sample` に無い変数は宣言済み変数名から `[name]` として埋める。
    pub async fn preview_template(
        &self,
        id: &EmailTemplateId,
        sample: TemplateContext,
    ) -> Result<RenderedEmail, CoreError> {
        let template = self.get_template(id).await?;

        let mut context: TemplateContext = template
            .variables()
            .iter()
            .map(|name| (name.clone(), format!("[{name}]")))
            .collect();
        context.extend(sample);

        self.renderer
            .render_email(&template, &context)
            .map_err(|e| CoreError::BadRequest(e.to_string()))
    }

    fn validate_content(
        &self,
        subject: &str,
        body_html: &str,
        body_text: &str,
    ) -> Result<(), CoreError> {
        if subject.trim().is_empty() {
            return Err(CoreError::BadRequest("件名は必須です".to_string()));
        }

        let candidate = EmailTemplate::new(
            EmailTemplateId::new(),
            String::new(),
            TemplateKind::Verification,
            subject.to_string(),
            body_html.to_string(),
            body_text.to_string(),
            Vec::new(),
            false,
            self.clock.now(),
        );
        self.renderer
            .render_email(&candidate, &TemplateContext::new())
            .map(|_| ())
            .map_err(|e| CoreError::BadRequest(e.to_string()))
    }
}

fn default_variables(kind: TemplateKind) -> Vec<String> {
    kind.variable_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn validate_name(name: &str) -> Result<String, CoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::BadRequest("テンプレート名は必須です".to_string()));
    }
    Ok(name.to_string())
}

fn duplicate_name(name: &str) -> CoreError {
    CoreError::Conflict(format!("同名のテンプレートが既に存在します: {name}"))
}

fn map_conflict(e: InfraError, name: &str) -> CoreError {
    if e.as_conflict().is_some() {
        return duplicate_name(name);
    }
    CoreError::Database(e)
}
