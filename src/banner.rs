use std::fs;

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::Datelike;

const YEAR_PLACEHOLDER: &str = "{year}";

/// The resolved banner text that gets prepended to every file.
///
/// Placeholders are expanded once at construction; the stored text is the
/// exact byte sequence written ahead of each file's original content.
#[derive(Clone, Debug)]
pub struct Banner {
    text: String,
}

impl Banner {
    pub fn from_text(raw: &str) -> Self {
        let year = chrono::Utc::now().year();
        Self {
            text: expand_placeholders(raw, year),
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("reading banner file {}", path))?;
        Ok(Self::from_text(&raw))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Exact prefix test; used by the `--skip-stamped` guard and `check`.
    pub fn matches(&self, content: &str) -> bool {
        content.starts_with(&self.text)
    }
}

fn expand_placeholders(raw: &str, year: i32) -> String {
    raw.replace(YEAR_PLACEHOLDER, &year.to_string())
}
