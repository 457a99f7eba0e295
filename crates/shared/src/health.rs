//! # ヘルスチェック

use serde::{Deserialize, Serialize};

/// `GET /health` のレスポンス
///
/// ```
/// use recipebox_shared::HealthResponse;
///
/// let health = HealthResponse::healthy("newsletter-service", "0.1.0");
/// assert_eq!(health.status, "healthy");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status:  String,
    /// 応答したサービス
    pub service: String,
    pub version: String,
}

impl HealthResponse {
    /// プロセスが応答できる状態
    pub fn healthy(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            status:  "healthy".to_string(),
            service: service.into(),
            version: version.into(),
        }
    }
}
