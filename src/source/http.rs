//! http 配置源：GET 参数 `url` 指向的文档
//!
//! 可选参数：`format`（json / toml，缺省按 Content-Type 推断，否则按 JSON）、`timeout_secs`（默认 10）。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::snapshot::ApplicationConfigSnapshot;
use crate::source::{source_arg, ConfigSource, DocumentFormat, LoadError, SourceArgs};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub struct HttpConfigSource {
    client: reqwest::Client,
}

impl HttpConfigSource {
    pub const NAME: &'static str = "http";

    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn timeout(args: &SourceArgs) -> Result<Duration, LoadError> {
        match source_arg(args, "timeout_secs") {
            None => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| LoadError::InvalidArgument {
                    key: "timeout_secs",
                    message: format!("expected a positive integer, got \"{raw}\""),
                }),
        }
    }

    fn format_from_content_type(content_type: Option<&str>) -> DocumentFormat {
        match content_type {
            Some(value) if value.to_ascii_lowercase().contains("toml") => DocumentFormat::Toml,
            _ => DocumentFormat::Json,
        }
    }
}

impl Default for HttpConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn read(&self, args: &SourceArgs) -> Result<ApplicationConfigSnapshot, LoadError> {
        let url = source_arg(args, "url").ok_or(LoadError::MissingArgument("url"))?;
        let explicit_format = source_arg(args, "format")
            .map(DocumentFormat::from_name)
            .transpose()?;
        let timeout = Self::timeout(args)?;

        tracing::debug!(url, "Fetching configuration");
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus(status.as_u16()));
        }

        let format = explicit_format.unwrap_or_else(|| {
            Self::format_from_content_type(
                response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok()),
            )
        });
        let body = response.text().await?;
        format.parse(&body)
    }
}
