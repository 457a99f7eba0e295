//! # レスポンスエンベロープ
//!
//! 単一リソースやメッセージを返すエンドポイントは `{ "data": ... }` で包む。
//! 一覧は [`crate::PaginatedResponse`] をそのまま返す。

use serde::{Deserialize, Serialize};

/// `{ "data": T }`
///
/// ```
/// use recipebox_shared::ApiResponse;
///
/// let body = ApiResponse::new(42);
/// assert_eq!(body.data, 42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
