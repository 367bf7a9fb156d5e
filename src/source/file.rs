//! file 配置源：参数 `file` 指定路径，按扩展名（.toml / .json）选择格式

use std::path::Path;

use async_trait::async_trait;

use crate::snapshot::ApplicationConfigSnapshot;
use crate::source::{source_arg, ConfigSource, DocumentFormat, LoadError, SourceArgs};

pub struct FileConfigSource;

impl FileConfigSource {
    pub const NAME: &'static str = "file";

    fn format_for(path: &Path) -> Result<DocumentFormat, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| LoadError::UnsupportedFormat(path.display().to_string()))?;
        DocumentFormat::from_name(extension)
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn read(&self, args: &SourceArgs) -> Result<ApplicationConfigSnapshot, LoadError> {
        let path = Path::new(source_arg(args, "file").ok_or(LoadError::MissingArgument("file"))?);
        let format = Self::format_for(path)?;

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.display().to_string(),
                source,
            })?;
        format.parse(&text)
    }
}
