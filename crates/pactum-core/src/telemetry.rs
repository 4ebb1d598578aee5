//! Telemetry - tracing subscriber の初期化
//!
//! - フィルタは `RUST_LOG`（未設定なら `info`）
//! - 出力形式は `LOG_FORMAT`: `text`（既定）か `json`
//! - 2 回目以降の呼び出しや、すでに global subscriber がある場合は何もしない

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt as layer_fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}': must be text or json")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber once.
pub fn init(format: LogFormat) {
    INITIALIZED.get_or_init(|| {
        let registry = tracing_subscriber::registry().with(env_filter());
        let result = match format {
            LogFormat::Text => registry
                .with(layer_fmt::layer().with_target(true))
                .try_init(),
            LogFormat::Json => registry
                .with(
                    layer_fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false),
                )
                .try_init(),
        };

        if result.is_err() {
            // すでに別の subscriber が入っている（テストなど）。そのまま使う
            tracing::debug!("global tracing subscriber already set");
        } else {
            tracing::debug!(format = %format, "logging initialized");
        }
    });
}
