//! 启动参数
//!
//! `hive [--config-provider NAME] [--config-refreshing] [--refresh-interval SECS] [--host-config PATH] [KEY VALUE]...`
//!
//! 末尾的 KEY VALUE 成对原样转发给配置源，例如 `hive --config-refreshing --file agents.toml`。
//! 宿主自己的选项需写在 KEY VALUE 之前。

use std::path::PathBuf;

use clap::Parser;

use crate::core::HostError;
use crate::source::SourceArgs;

#[derive(Debug, Parser)]
#[command(name = "hive")]
#[command(about = "Host process that runs pluggable agents and keeps them in sync with configuration")]
#[command(version)]
pub struct LaunchArgs {
    /// 配置源名称（默认取宿主配置 host.default_provider）
    #[arg(long = "config-provider", value_name = "NAME")]
    pub config_provider: Option<String>,

    /// 开启周期刷新
    #[arg(long = "config-refreshing")]
    pub config_refreshing: bool,

    /// 刷新间隔（秒），覆盖宿主配置
    #[arg(long = "refresh-interval", value_name = "SECS")]
    pub refresh_interval_secs: Option<u64>,

    /// 额外的宿主配置文件
    #[arg(long = "host-config", value_name = "PATH")]
    pub host_config: Option<PathBuf>,

    /// 转发给配置源的 KEY VALUE 对
    #[arg(
        value_name = "KEY VALUE",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub source_args: Vec<String>,
}

impl LaunchArgs {
    /// 把 KEY VALUE 序列配对；个数为奇数时报错
    pub fn source_args(&self) -> Result<SourceArgs, HostError> {
        if self.source_args.len() % 2 != 0 {
            return Err(HostError::InvalidArgs(format!(
                "source arguments must come in KEY VALUE pairs, \"{}\" has no value",
                self.source_args[self.source_args.len() - 1]
            )));
        }

        Ok(self
            .source_args
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect())
    }
}
