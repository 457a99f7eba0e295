//! # テンプレートレンダラー
//!
//! プレースホルダと 1 段の条件ブロックだけを持つ最小限のテンプレート言語で
//! メールの件名・HTML 本文・テキスト本文を生成する。
//!
//! ## 記法
//!
//! | 記法 | 意味 |
//! |------|------|
//! | `{{name}}` | 値を埋め込む（HTML 本文では `tera::escape_html` でエスケープする） |
//! | `{{{name}}}` | 値をエスケープせずに埋め込む（レシピ説明文などのリッチテキスト用） |
//! | `{{#if name}}...{{/if}}` | 値が真のときだけ中身を出力する |
//!
//! ## 設計方針
//!
//! - **ループ・入れ子の条件・式は持たない**: 管理画面から編集されるテンプレートに
//!   ロジックを書かせない
//! - **未定義の変数は空文字列**: 送信を止めない
//! - **置換は 1 パス**: 値に含まれる `{{...}}` は展開しない
//! - **閉じていない条件ブロックや入れ子はエラー**: [`NotificationError::TemplateFailed`]

use recipebox_domain::{
    email_template::{EmailTemplate, TemplateContext},
    notification::NotificationError,
};
use regex::{Captures, Regex};

const IF_BLOCK_PATTERN: &str = r"(?s)\{\{#if\s+(\w+)\s*\}\}(.*?)\{\{/if\}\}";
const PLACEHOLDER_PATTERN: &str = r"\{\{\{\s*(\w+)\s*\}\}\}|\{\{\s*(\w+)\s*\}\}";

const IF_OPEN: &str = "{{#if";
const IF_CLOSE: &str = "{{/if}}";

/// 出力先の形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// HTML 本文（`{{name}}` をエスケープする）
    Html,
    /// 件名・テキスト本文（エスケープしない）
    Text,
}

/// レンダリング済みのメール
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject:   String,
    pub html_body: String,
    pub text_body: String,
}

/// テンプレートレンダラー
///
/// 正規表現は作成時に一度だけコンパイルし、以降は共有する。
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    if_block:    Regex,
    placeholder: Regex,
}

impl TemplateRenderer {
    /// 新しいレンダラーインスタンスを作成
    pub fn new() -> Result<Self, NotificationError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| NotificationError::TemplateFailed(e.to_string()))
        };

        Ok(Self {
            if_block:    compile(IF_BLOCK_PATTERN)?,
            placeholder: compile(PLACEHOLDER_PATTERN)?,
        })
    }

    /// テンプレート文字列をレンダリングする
    pub fn render(
        &self,
        source: &str,
        context: &TemplateContext,
        mode: RenderMode,
    ) -> Result<String, NotificationError> {
        let resolved = self.resolve_conditionals(source, context)?;

        let rendered = self.placeholder.replace_all(&resolved, |caps: &Captures| {
            if let Some(raw) = caps.get(1) {
                return lookup(context, raw.as_str()).to_string();
            }
            let value = caps.get(2).map_or("", |name| lookup(context, name.as_str()));
            match mode {
                RenderMode::Html => tera::escape_html(value),
                RenderMode::Text => value.to_string(),
            }
        });

        Ok(rendered.into_owned())
    }

    /// メールテンプレートの件名・HTML 本文・テキスト本文をまとめてレンダリングする
    pub fn render_email(
        &self,
        template: &EmailTemplate,
        context: &TemplateContext,
    ) -> Result<RenderedEmail, NotificationError> {
        Ok(RenderedEmail {
            subject:   self
                .render(template.subject(), context, RenderMode::Text)?
                .trim()
                .to_string(),
            html_body: self.render(template.body_html(), context, RenderMode::Html)?,
            text_body: self.render(template.body_text(), context, RenderMode::Text)?,
        })
    }

    fn resolve_conditionals(
        &self,
        source: &str,
        context: &TemplateContext,
    ) -> Result<String, NotificationError> {
        let mut output = String::with_capacity(source.len());
        let mut last = 0;

        for caps in self.if_block.captures_iter(source) {
            let (Some(whole), Some(name), Some(body)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            if body.as_str().contains(IF_OPEN) {
                return Err(NotificationError::TemplateFailed(format!(
                    "条件ブロックは入れ子にできません: {{{{#if {}}}}}",
                    name.as_str()
                )));
            }

            output.push_str(&source[last..whole.start()]);
            if is_truthy(context, name.as_str()) {
                output.push_str(body.as_str());
            }
            last = whole.end();
        }
        output.push_str(&source[last..]);

        if output.contains(IF_OPEN) || output.contains(IF_CLOSE) {
            return Err(NotificationError::TemplateFailed(
                "対応する {{#if}} / {{/if}} がありません".to_string(),
            ));
        }

        Ok(output)
    }
}

fn lookup<'a>(context: &'a TemplateContext, name: &str) -> &'a str {
    context.get(name).map_or("", String::as_str)
}

/// 空文字列・`"false"`・`"0"` は偽
fn is_truthy(context: &TemplateContext, name: &str) -> bool {
    !matches!(lookup(context, name).trim(), "" | "false" | "0")
}
