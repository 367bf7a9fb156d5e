//! LetterPrinterAgent：每隔 interval_ms 打印配置中的 `letter`（单个字母）

use serde::Deserialize;

use crate::agents::{AgentError, PrinterAgent};
use crate::snapshot::AgentConfigEntry;

pub type LetterPrinterAgent = PrinterAgent<char>;

#[derive(Deserialize)]
struct LetterSettings {
    letter: String,
}

fn parse_letter(config: &AgentConfigEntry) -> Result<char, AgentError> {
    let settings: LetterSettings = config
        .deserialize()
        .map_err(|e| AgentError::Config(e.to_string()))?;

    let mut chars = settings.letter.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_alphabetic() => Ok(letter),
        _ => Err(AgentError::Config(format!(
            "\"letter\" must be a single letter, got \"{}\"",
            settings.letter
        ))),
    }
}

impl PrinterAgent<char> {
    pub const NAME: &'static str = "LetterPrinterAgent";

    pub fn new() -> Self {
        Self::with_parser(Self::NAME, parse_letter)
    }
}

impl Default for PrinterAgent<char> {
    fn default() -> Self {
        Self::new()
    }
}
