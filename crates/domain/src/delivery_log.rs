//! # 配信ログ
//!
//! メール送信の最終結果を記録する追記専用のログ。
//! リトライの途中経過は記録せず、成功または再試行を使い切った失敗のみを 1 行として残す。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{email_template::EmailTemplateId, subscriber::SubscriberId};

define_uuid_id! {
    /// 配信ログ ID（一意識別子）
    pub struct DeliveryLogId;
}

/// 配信ステータス
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Pending,
}

/// 配信ログエントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryLog {
    pub id:            DeliveryLogId,
    pub subscriber_id: Option<SubscriberId>,
    pub recipient:     String,
    pub subject:       String,
    /// テンプレートを使わない個別送信では None
    pub template_id:   Option<EmailTemplateId>,
    pub status:        DeliveryStatus,
    pub error:         Option<String>,
    pub sent_at:       Option<DateTime<Utc>>,
    pub created_at:    DateTime<Utc>,
}

impl DeliveryLog {
    /// 送信成功のログを作成する
    pub fn sent(
        subscriber_id: Option<SubscriberId>,
        recipient: String,
        subject: String,
        template_id: Option<EmailTemplateId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryLogId::new(),
            subscriber_id,
            recipient,
            subject,
            template_id,
            status: DeliveryStatus::Sent,
            error: None,
            sent_at: Some(now),
            created_at: now,
        }
    }

    /// 送信失敗のログを作成する
    pub fn failed(
        subscriber_id: Option<SubscriberId>,
        recipient: String,
        subject: String,
        template_id: Option<EmailTemplateId>,
        error: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryLogId::new(),
            subscriber_id,
            recipient,
            subject,
            template_id,
            status: DeliveryStatus::Failed,
            error: Some(error),
            sent_at: None,
            created_at: now,
        }
    }
}

/// 配信ログの検索条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryLogFilter {
    pub status:      Option<DeliveryStatus>,
    /// 宛先の部分一致
    pub recipient:   Option<String>,
    pub template_id: Option<EmailTemplateId>,
    pub from:        Option<DateTime<Utc>>,
    pub to:          Option<DateTime<Utc>>,
}

impl DeliveryLogFilter {
    /// ログが条件に一致するか判定する
    pub fn matches(&self, log: &DeliveryLog) -> bool {
        self.status.is_none_or(|status| log.status == status)
            && self
                .recipient
                .as_deref()
                .is_none_or(|recipient| log.recipient.contains(recipient))
            && self
                .template_id
                .as_ref()
                .is_none_or(|id| log.template_id.as_ref() == Some(id))
            && self.from.is_none_or(|from| log.created_at >= from)
            && self.to.is_none_or(|to| log.created_at <= to)
    }
}

/// 配信統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub total:        u64,
    pub sent:         u64,
    pub failed:       u64,
    pub pending:      u64,
    /// 成功率（%）。ログが 0 件なら 0
    pub success_rate: f64,
}

impl DeliveryStats {
    /// ステータスごとの件数から統計を組み立てる
    pub fn from_counts(sent: u64, failed: u64, pending: u64) -> Self {
        let total = sent + failed + pending;
        let success_rate = if total == 0 {
            0.0
        } else {
            (sent as f64 / total as f64 * 10000.0).round() / 100.0
        };

        Self {
            total,
            sent,
            failed,
            pending,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_成功ログは送信日時を持ちエラーを持たない() {
        let log = DeliveryLog::sent(
            None,
            "a@example.com".to_string(),
            "件名".to_string(),
            None,
            now(),
        );

        assert_eq!(log.status, DeliveryStatus::Sent);
        assert_eq!(log.sent_at, Some(now()));
        assert_eq!(log.error, None);
    }

    #[test]
    fn test_失敗ログはエラーを持ち送信日時を持たない() {
        let log = DeliveryLog::failed(
            Some(SubscriberId::new()),
            "a@example.com".to_string(),
            "件名".to_string(),
            None,
            "connection refused".to_string(),
            now(),
        );

        assert_eq!(log.status, DeliveryStatus::Failed);
        assert_eq!(log.sent_at, None);
        assert_eq!(log.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_フィルタは全条件を満たすログに一致する() {
        let template_id = EmailTemplateId::new();
        let log = DeliveryLog::sent(
            None,
            "alice@example.com".to_string(),
            "件名".to_string(),
            Some(template_id.clone()),
            now(),
        );
        let filter = DeliveryLogFilter {
            status:      Some(DeliveryStatus::Sent),
            recipient:   Some("alice".to_string()),
            template_id: Some(template_id),
            from:        Some(now() - Duration::hours(1)),
            to:          Some(now()),
        };

        assert!(filter.matches(&log));
        assert!(DeliveryLogFilter::default().matches(&log));
    }

    #[test]
    fn test_フィルタは条件が1つでも外れると一致しない() {
        let log = DeliveryLog::sent(
            None,
            "alice@example.com".to_string(),
            "件名".to_string(),
            None,
            now(),
        );

        let by_status = DeliveryLogFilter {
            status: Some(DeliveryStatus::Failed),
            ..Default::default()
        };
        let by_template = DeliveryLogFilter {
            template_id: Some(EmailTemplateId::new()),
            ..Default::default()
        };
        let by_date = DeliveryLogFilter {
            from: Some(now() + Duration::seconds(1)),
            ..Default::default()
        };

        assert!(!by_status.matches(&log));
        assert!(!by_template.matches(&log));
        assert!(!by_date.matches(&log));
    }

    #[test]
    fn test_統計は成功率を小数第2位で丸める() {
        let stats = DeliveryStats::from_counts(2, 1, 0);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.success_rate, 66.67);
    }

    #[test]
    fn test_ログが0件なら成功率は0() {
        assert_eq!(DeliveryStats::from_counts(0, 0, 0).success_rate, 0.0);
    }
}
