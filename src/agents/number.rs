//! NumberPrinterAgent：每隔 interval_ms 打印配置中的 `number`

use serde::Deserialize;

use crate::agents::{AgentError, PrinterAgent};
use crate::snapshot::AgentConfigEntry;

pub type NumberPrinterAgent = PrinterAgent<i64>;

#[derive(Deserialize)]
struct NumberSettings {
    number: i64,
}

fn parse_number(config: &AgentConfigEntry) -> Result<i64, AgentError> {
    config
        .deserialize::<NumberSettings>()
        .map(|settings| settings.number)
        .map_err(|e| AgentError::Config(e.to_string()))
}

impl PrinterAgent<i64> {
    pub const NAME: &'static str = "NumberPrinterAgent";

    pub fn new() -> Self {
        Self::with_parser(Self::NAME, parse_number)
    }
}

impl Default for PrinterAgent<i64> {
    fn default() -> Self {
        Self::new()
    }
}
