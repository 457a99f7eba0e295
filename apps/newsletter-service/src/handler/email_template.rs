//! # メールテンプレートハンドラ
//!
//! 管理画面向けのテンプレート管理 API。
//!
//! ## エンドポイント
//!
//! - `GET /internal/email-templates` - 一覧
//! - `POST /internal/email-templates` - 作成
//! - `GET /internal/email-templates/{id}` - 詳細
//! - `PATCH /internal/email-templates/{id}` - 部分更新
//! - `DELETE /internal/email-templates/{id}` - 削除（既定テンプレートは不可）
//! - `POST /internal/email-templates/{id}/default` - 種別の既定にする
//! - `POST /internal/email-templates/{id}/preview` - 送信せずにレンダリング

use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use recipebox_domain::email_template::{EmailTemplate, EmailTemplateId, TemplateKind};
use recipebox_shared::ApiResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::CoreError,
    usecase::{CreateTemplateInput, RenderedEmail, TemplateStore, UpdateTemplateInput},
};

/// テンプレート API の共有状態
pub struct EmailTemplateState {
    pub store: Arc<TemplateStore>,
}

// --- リクエスト/レスポンス型 ---

/// テンプレート DTO
#[derive(Debug, Serialize)]
pub struct EmailTemplateDto {
    pub id:         Uuid,
    pub name:       String,
    pub kind:       TemplateKind,
    pub subject:    String,
    pub body_html:  String,
    pub body_text:  String,
    pub variables:  Vec<String>,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<EmailTemplate> for EmailTemplateDto {
    fn from(template: EmailTemplate) -> Self {
        Self {
            id:         *template.id().as_uuid(),
            name:       template.name().to_string(),
            kind:       template.kind(),
            subject:    template.subject().to_string(),
            body_html:  template.body_html().to_string(),
            body_text:  template.body_text().to_string(),
            variables:  template.variables().to_vec(),
            is_default: template.is_default(),
            created_at: template.created_at().to_rfc3339(),
            updated_at: template.updated_at().to_rfc3339(),
        }
    }
}

/// プレビュー結果 DTO
#[derive(Debug, Serialize)]
pub struct RenderedEmailDto {
    pub subject:   String,
    pub html_body: String,
    pub text_body: String,
}

impl From<RenderedEmail> for RenderedEmailDto {
    fn from(rendered: RenderedEmail) -> Self {
        Self {
            subject:   rendered.subject,
            html_body: rendered.html_body,
            text_body: rendered.text_body,
        }
    }
}

/// テンプレート作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name:       String,
    pub kind:       TemplateKind,
    pub subject:    String,
    pub body_html:  String,
    pub body_text:  String,
    pub variables:  Option<Vec<String>>,
    #[serde(default)]
    pub is_default: bool,
}

/// テンプレート更新リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name:      Option<String>,
    pub subject:   Option<String>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub variables: Option<Vec<String>>,
}

/// プレビューリクエスト
#[derive(Debug, Default, Deserialize)]
pub struct PreviewTemplateRequest {
    /// サンプル値（未指定の変数は `[name]` で埋める）
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

// --- ハンドラ ---

/// GET /internal/email-templates
pub async fn list_templates(
    State(state): State<Arc<EmailTemplateState>>,
) -> Result<impl IntoResponse, CoreError> {
    let templates: Vec<EmailTemplateDto> = state
        .store
        .list_templates()
        .await?
        .into_iter()
        .map(EmailTemplateDto::from)
        .collect();

    Ok((StatusCode::OK, Json(ApiResponse::new(templates))))
}

/// GET /internal/email-templates/{id}
pub async fn get_template(
    State(state): State<Arc<EmailTemplateState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, CoreError> {
    let template = state
        .store
        .get_template(&EmailTemplateId::from_uuid(id))
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(EmailTemplateDto::from(template))),
    ))
}

/// POST /internal/email-templates
///
/// ## レスポンス
///
/// - `201 Created`: 作成されたテンプレート
/// - `400 Bad Request`: 名前・件名が空、またはレンダリングできない
/// - `409 Conflict`: 同名のテンプレートが存在する
pub async fn create_template(
    State(state): State<Arc<EmailTemplateState>>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let input = CreateTemplateInput {
        name:       req.name,
        kind:       req.kind,
        subject:    req.subject,
        body_html:  req.body_html,
        body_text:  req.body_text,
        variables:  req.variables,
        is_default: req.is_default,
    };

    let template = state.store.create_template(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(EmailTemplateDto::from(template))),
    ))
}

/// PATCH /internal/email-templates/{id}
pub async fn update_template(
    State(state): State<Arc<EmailTemplateState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTemplateRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let input = UpdateTemplateInput {
        name:      req.name,
        subject:   req.subject,
        body_html: req.body_html,
        body_text: req.body_text,
        variables: req.variables,
    };

    let template = state
        .store
        .update_template(&EmailTemplateId::from_uuid(id), input)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(EmailTemplateDto::from(template))),
    ))
}

/// DELETE /internal/email-templates/{id}
///
/// ## レスポンス
///
/// - `204 No Content`: 削除成功
/// - `400 Bad Request`: 既定テンプレート
/// - `404 Not Found`: テンプレートが見つからない
pub async fn delete_template(
    State(state): State<Arc<EmailTemplateState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, CoreError> {
    state
        .store
        .delete_template(&EmailTemplateId::from_uuid(id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /internal/email-templates/{id}/default
///
/// 同じ種別の既定テンプレートを切り替える。
pub async fn set_default_template(
    State(state): State<Arc<EmailTemplateState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, CoreError> {
    let template = state
        .store
        .set_default(&EmailTemplateId::from_uuid(id))
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(EmailTemplateDto::from(template))),
    ))
}

/// POST /internal/email-templates/{id}/preview
pub async fn preview_template(
    State(state): State<Arc<EmailTemplateState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<PreviewTemplateRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let rendered = state
        .store
        .preview_template(&EmailTemplateId::from_uuid(id), req.variables)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(RenderedEmailDto::from(rendered))),
    ))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, header},
        routing::{get, post},
    };
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;
    use crate::test_utils::{NewsletterTestBuilder, NewsletterTestSetup};

    fn create_test_app(setup: &NewsletterTestSetup) -> Router {
        let state = Arc::new(EmailTemplateState {
            store: setup.template_store.clone(),
        });

        Router::new()
            .route(
                "/internal/email-templates",
                get(list_templates).post(create_template),
            )
            .route(
                "/internal/email-templates/{id}",
                get(get_template)
                    .patch(update_template)
                    .delete(delete_template),
            )
            .route(
                "/internal/email-templates/{id}/default",
                post(set_default_template),
            )
            .route(
                "/internal/email-templates/{id}/preview",
                post(preview_template),
            )
            .with_state(state)
    }

    fn request(method: Method, uri: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn default_template_id(setup: &NewsletterTestSetup, kind: TemplateKind) -> Uuid {
        *setup
            .template_repo
            .all()
            .into_iter()
            .find(|t| t.kind() == kind && t.is_default())
            .unwrap()
            .id()
            .as_uuid()
    }

    #[tokio::test]
    async fn test_list_templates_組み込みテンプレートを返す() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(request(Method::GET, "/internal/email-templates", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_create_template_201を返す() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(request(
                Method::POST,
                "/internal/email-templates",
                Some(
                    r#"{"name":"spring-welcome","kind":"welcome","subject":"春の {{site_name}}","body_html":"<p>{{email}}</p>","body_text":"{{email}}"}"#,
                ),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["name"], "spring-welcome");
        assert_eq!(json["data"]["kind"], "welcome");
        assert_eq!(json["data"]["is_default"], false);
    }

    #[tokio::test]
    async fn test_create_template_同名は409() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(request(
                Method::POST,
                "/internal/email-templates",
                Some(
                    r#"{"name":"welcome-default","kind":"welcome","subject":"件名","body_html":"<p></p>","body_text":""}"#,
                ),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_delete_template_既定テンプレートは400() {
        let setup = NewsletterTestBuilder::new().build().await;
        let id = default_template_id(&setup, TemplateKind::Welcome);
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(request(
                Method::DELETE,
                &format!("/internal/email-templates/{id}"),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_template_存在しないidは404() {
        let setup = NewsletterTestBuilder::new().build().await;
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(request(
                Method::GET,
                &format!("/internal/email-templates/{}", Uuid::now_v7()),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preview_template_サンプル値と宣言済み変数で描画する() {
        let setup = NewsletterTestBuilder::new().build().await;
        let id = default_template_id(&setup, TemplateKind::NewContent);
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(request(
                Method::POST,
                &format!("/internal/email-templates/{id}/preview"),
                Some(r#"{"variables":{"title":"肉じゃが","site_name":"Recipebox"}}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["subject"], "【Recipebox】新着レシピ: 肉じゃが");
        assert!(
            json["data"]["html_body"]
                .as_str()
                .unwrap()
                .contains("[recipe_url]")
        );
        assert_eq!(setup.transport.attempts().len(), 0);
    }

    #[tokio::test]
    async fn test_set_default_template_既定が切り替わる() {
        let setup = NewsletterTestBuilder::new().build().await;
        let previous = default_template_id(&setup, TemplateKind::Welcome);
        let created = setup
            .template_store
            .create_template(CreateTemplateInput {
                name:       "autumn-welcome".to_string(),
                kind:       TemplateKind::Welcome,
                subject:    "秋の {{site_name}}".to_string(),
                body_html:  "<p>{{email}}</p>".to_string(),
                body_text:  "{{email}}".to_string(),
                variables:  None,
                is_default: false,
            })
            .await
            .unwrap();
        let sut = create_test_app(&setup);

        let response = sut
            .oneshot(request(
                Method::POST,
                &format!("/internal/email-templates/{}/default", created.id()),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            default_template_id(&setup, TemplateKind::Welcome),
            *created.id().as_uuid()
        );
        assert_ne!(previous, *created.id().as_uuid());
    }
}
