//! # Newsletter Service エラー定義
//!
//! サービス固有のエラーと、HTTP レスポンス（RFC 7807 Problem Details）への変換を定義する。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use recipebox_domain::{DomainError, subscriber::SubscriptionError};
use recipebox_infra::InfraError;
use recipebox_shared::{ErrorResponse, event_log::error};
use thiserror::Error;

/// Newsletter Service で発生するエラー
#[derive(Debug, Error)]
pub enum CoreError {
    /// リソースが見つからない
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),

    /// 競合（重複登録、状態遷移の拒否）
    #[error("競合が発生しました: {0}")]
    Conflict(String),

    /// かつて有効だったが使えなくなった（期限切れトークン）
    #[error("期限切れです: {0}")]
    Gone(String),

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(#[from] InfraError),

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<DomainError> for CoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => CoreError::BadRequest(msg),
        }
    }
}

impl From<SubscriptionError> for CoreError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::AlreadySubscribed | SubscriptionError::AlreadyUnsubscribed => {
                CoreError::Conflict(err.to_string())
            }
            SubscriptionError::TokenExpired | SubscriptionError::VerificationRevoked => {
                CoreError::Gone(err.to_string())
            }
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let body = match &self {
            CoreError::NotFound(msg) => ErrorResponse::not_found(msg.clone()),
            CoreError::BadRequest(msg) => ErrorResponse::bad_request(msg.clone()),
            CoreError::Conflict(msg) => ErrorResponse::conflict(msg.clone()),
            CoreError::Gone(msg) => ErrorResponse::gone(msg.clone()),
            CoreError::Database(e) => {
                tracing::error!(
                    error.category = error::category::INFRASTRUCTURE,
                    error.kind = error::kind::DATABASE,
                    span_trace = %e.span_trace(),
                    "データベースエラー: {}",
                    e
                );
                ErrorResponse::internal_error()
            }
            CoreError::Internal(msg) => {
                tracing::error!("内部エラー: {}", msg);
                ErrorResponse::internal_error()
            }
        };

        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CoreError::NotFound("x".to_string()), StatusCode::NOT_FOUND)]
    #[case(CoreError::BadRequest("x".to_string()), StatusCode::BAD_REQUEST)]
    #[case(CoreError::Conflict("x".to_string()), StatusCode::CONFLICT)]
    #[case(CoreError::Gone("x".to_string()), StatusCode::GONE)]
    #[case(CoreError::Internal("x".to_string()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(CoreError::Database(InfraError::invalid_data("x")), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_エラー種別ごとのステータスコード(
        #[case] error: CoreError,
        #[case] expected: StatusCode,
    ) {
        let response = error.into_response();

        assert_eq!(response.status(), expected);
    }

    #[test]
    fn test_期限切れトークンは410に変換される() {
        let error = CoreError::from(SubscriptionError::TokenExpired);

        assert!(matches!(error, CoreError::Gone(_)));
    }

    #[test]
    fn test_解除済み購読者の確認リンクは410に変換される() {
        let error = CoreError::from(SubscriptionError::VerificationRevoked);

        assert!(matches!(error, CoreError::Gone(_)));
    }

    #[test]
    fn test_購読済みは409に変換される() {
        let error = CoreError::from(SubscriptionError::AlreadySubscribed);

        assert!(matches!(error, CoreError::Conflict(_)));
    }

    #[test]
    fn test_バリデーションエラーは400に変換される() {
        let error = CoreError::from(DomainError::Validation("不正".to_string()));

        assert!(matches!(error, CoreError::BadRequest(msg) if msg == "不正"));
    }
}
