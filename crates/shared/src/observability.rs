//! # トレーシング初期化
//!
//! ログの出力形式とフィルタを環境変数から決め、`tracing-subscriber` を組み立てる。
//!
//! | 変数 | 値 | 既定 |
//! |------|----|------|
//! | `LOG_FORMAT` | `json` / `pretty` | `pretty` |
//! | `RUST_LOG` | `EnvFilter` の書式 | [`DEFAULT_FILTER`] |
//!
//! JSON 形式ではイベントのフィールドをトップレベルに展開するため、
//! `log_business_event!` の `event.*` フィールドをそのまま集計できる。

/// `RUST_LOG` 未設定時のフィルタ
///
/// SMTP セッションと SQL のログは量が多いので warn 以上に絞る。
pub const DEFAULT_FILTER: &str = "info,recipebox=debug,sqlx=warn,lettre=warn";

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 1 行 1 JSON（本番）
    Json,
    /// 開発用
    #[default]
    Pretty,
}

impl LogFormat {
    /// `LOG_FORMAT` の値を解釈する
    ///
    /// 未設定・不明な値は [`LogFormat::Pretty`]。大文字小文字は区別しない。
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            Some("pretty") | Some("") | None => Self::Pretty,
            Some(other) => {
                // subscriber の初期化前なので tracing は使えない
                eprintln!("LOG_FORMAT={other:?} は不明な値のため pretty で出力します");
                Self::Pretty
            }
        }
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// 起動ログに出すサービス名
    pub service_name: String,
    pub log_format:   LogFormat,
    /// `RUST_LOG` が無い場合に使うフィルタ
    pub fallback_filter: String,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
            fallback_filter: DEFAULT_FILTER.to_string(),
        }
    }

    /// `LOG_FORMAT` を読んで設定を作る
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let format = std::env::var("LOG_FORMAT").ok();
        Self::new(service_name, LogFormat::from_value(format.as_deref()))
    }
}

/// グローバルな subscriber を登録する
///
/// `tracing_error::ErrorLayer` も登録し、`InfraError` の `SpanTrace` に
/// 呼び出し経路が残るようにする。2 回目以降の呼び出しは無視される。
#[cfg(feature = "observability")]
pub fn init_tracing(config: TracingConfig) {
    use tracing_subscriber::{EnvFilter, Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.fallback_filter));

    let output = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service = %config.service_name,
            format = ?config.log_format,
            "ログ出力を開始しました"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonを指定するとjson形式() {
        assert_eq!(LogFormat::from_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_value(Some(" JSON ")), LogFormat::Json);
    }

    #[test]
    fn test_未設定や不明な値はpretty形式() {
        assert_eq!(LogFormat::from_value(None), LogFormat::Pretty);
        assert_eq!(LogFormat::from_value(Some("")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_value(Some("logfmt")), LogFormat::Pretty);
    }

    #[test]
    fn test_既定のフィルタはsmtpとsqlのログを絞る() {
        let config = TracingConfig::new("newsletter-service", LogFormat::Json);

        assert_eq!(config.service_name, "newsletter-service");
        assert!(config.fallback_filter.contains("lettre=warn"));
        assert!(config.fallback_filter.contains("sqlx=warn"));
    }
}
