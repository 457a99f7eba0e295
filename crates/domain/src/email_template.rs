//! # メールテンプレート
//!
//! 種別ごとに名前付きで管理されるメールテンプレートと、
//! 種別ごとのテンプレート変数を定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`EmailTemplate`] | メールテンプレート | 件名・HTML 本文・テキスト本文の組 |
//! | [`TemplateKind`] | テンプレート種別 | 確認、ウェルカム、新着レシピ、購読解除確認の 4 種類 |
//! | [`TemplateVariables`] | テンプレート変数 | 種別ごとに必要な変数を持つ閉じた列挙型 |
//!
//! ## 設計方針
//!
//! - **既定テンプレートは種別ごとに最大 1 件**: 切り替えはリポジトリが 1 トランザクションで行う
//! - **変数は種別ごとの列挙型**: 任意のキーを渡す代わりに、必要な変数の欠落をコンパイル時に検出する
//! - **レンダリングはサービス層**: ここではプレースホルダを含む文字列を保持するだけ

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

define_uuid_id! {
    /// メールテンプレート ID（一意識別子）
    pub struct EmailTemplateId;
}

/// レンダラーに渡す変数マップ
pub type TemplateContext = HashMap<String, String>;

/// テンプレート種別
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TemplateKind {
    /// 購読確認（ダブルオプトイン）
    Verification,
    /// 購読開始のお知らせ
    Welcome,
    /// 新着レシピの配信
    NewContent,
    /// 購読解除の確認
    UnsubscribeConfirmation,
}

impl TemplateKind {
    /// この種別のテンプレートで利用できる変数名
    pub fn variable_names(self) -> &'static [&'static str] {
        match self {
            Self::Verification => &["email", "verification_url", "site_name"],
            Self::Welcome => &["email", "unsubscribe_url", "site_url", "site_name"],
            Self::NewContent => &[
                "title",
                "description",
                "image_url",
                "cooking_time",
                "servings",
                "calories",
                "recipe_url",
                "unsubscribe_url",
                "site_name",
            ],
            Self::UnsubscribeConfirmation => &["email", "resubscribe_url", "site_name"],
        }
    }
}

/// 種別ごとのテンプレート変数
///
/// [`TemplateVariables::into_context`] でレンダラー用のマップに変換する。
/// `None` の値はマップに含めないため、`{{#if}}` で偽と判定される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateVariables {
    Verification {
        email:            String,
        verification_url: String,
    },
    Welcome {
        email:           String,
        unsubscribe_url: String,
        site_url:        String,
    },
    NewContent {
        title:           String,
        /// HTML を含むリッチテキスト（`{{{description}}}` でエスケープせず展開する）
        description:     String,
        image_url:       Option<String>,
        cooking_time:    u32,
        servings:        u32,
        calories:        u32,
        recipe_url:      String,
        unsubscribe_url: String,
    },
    UnsubscribeConfirmation {
        email:           String,
        resubscribe_url: String,
    },
}

impl TemplateVariables {
    /// 対応するテンプレート種別を返す
    pub fn kind(&self) -> TemplateKind {
        match self {
            Self::Verification { .. } => TemplateKind::Verification,
            Self::Welcome { .. } => TemplateKind::Welcome,
            Self::NewContent { .. } => TemplateKind::NewContent,
            Self::UnsubscribeConfirmation { .. } => TemplateKind::UnsubscribeConfirmation,
        }
    }

    /// レンダラー用の変数マップに変換する
    pub fn into_context(self) -> TemplateContext {
        let mut context = TemplateContext::new();
        match self {
            Self::Verification {
                email,
                verification_url,
            } => {
                context.insert("email".to_string(), email);
                context.insert("verification_url".to_string(), verification_url);
            }
            Self::Welcome {
                email,
                unsubscribe_url,
                site_url,
            } => {
                context.insert("email".to_string(), email);
                context.insert("unsubscribe_url".to_string(), unsubscribe_url);
                context.insert("site_url".to_string(), site_url);
            }
            Self::NewContent {
                title,
                description,
                image_url,
                cooking_time,
                servings,
                calories,
                recipe_url,
                unsubscribe_url,
            } => {
                context.insert("title".to_string(), title);
                context.insert("description".to_string(), description);
                if let Some(image_url) = image_url {
                    context.insert("image_url".to_string(), image_url);
                }
                context.insert("cooking_time".to_string(), cooking_time.to_string());
                context.insert("servings".to_string(), servings.to_string());
                context.insert("calories".to_string(), calories.to_string());
                context.insert("recipe_url".to_string(), recipe_url);
                context.insert("unsubscribe_url".to_string(), unsubscribe_url);
            }
            Self::UnsubscribeConfirmation {
                email,
                resubscribe_url,
            } => {
                context.insert("email".to_string(), email);
                context.insert("resubscribe_url".to_string(), resubscribe_url);
            }
        }
        context
    }
}

/// メールテンプレートエンティティ
///
/// # 不変条件
///
/// - `name` は全テンプレートで一意
/// - 同じ `kind` で `is_default` が true のテンプレートは最大 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    id: EmailTemplateId,
    name: String,
    kind: TemplateKind,
    subject: String,
    body_html: String,
    body_text: String,
    variables: Vec<String>,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EmailTemplate {
    /// 新しいテンプレートを作成する
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EmailTemplateId,
        name: String,
        kind: TemplateKind,
        subject: String,
        body_html: String,
        body_text: String,
        variables: Vec<String>,
        is_default: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            subject,
            body_html,
            body_text,
            variables,
            is_default,
            created_at: now,
            updated_at: now,
        }
    }

    /// 既存のデータからテンプレートを復元する（データベースから取得時）
    #[allow(clippy::too_many_arguments)]
    pub fn from_db(
        id: EmailTemplateId,
        name: String,
        kind: TemplateKind,
        subject: String,
        body_html: String,
        body_text: String,
        variables: Vec<String>,
        is_default: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            subject,
            body_html,
            body_text,
            variables,
            is_default,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &EmailTemplateId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body_html(&self) -> &str {
        &self.body_html
    }

    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 名前を変更した新しいインスタンスを返す
    pub fn with_name(self, name: String, now: DateTime<Utc>) -> Self {
        Self {
            name,
            updated_at: now,
            ..self
        }
    }

    /// 件名・本文を変更した新しいインスタンスを返す
    pub fn with_content(
        self,
        subject: String,
        body_html: String,
        body_text: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            subject,
            body_html,
            body_text,
            updated_at: now,
            ..self
        }
    }

    /// 宣言変数を変更した新しいインスタンスを返す
    pub fn with_variables(self, variables: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            variables,
            updated_at: now,
            ..self
        }
    }

    /// 既定フラグを変更した新しいインスタンスを返す
    pub fn with_default(self, is_default: bool, now: DateTime<Utc>) -> Self {
        Self {
            is_default,
            updated_at: now,
            ..self
        }
    }
}
