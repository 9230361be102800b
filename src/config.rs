use std::fmt::Write as _;
use std::fs;

use anyhow::{Context, Result, anyhow, bail};
use camino::Utf8Path;
use serde::Deserialize;
use toml_edit::{DocumentMut, Item, Table, value};

use crate::stamper::DecodePolicy;

/// Root configuration document loaded from `.stamp/config.toml` by default.
#[derive(Debug, Default, Deserialize)]
pub struct StampConfig {
    pub target: Option<String>,
    pub decode: Option<DecodePolicy>,
    #[serde(default)]
    pub skip_stamped: bool,
    pub banner: Option<BannerConfig>,
}

/// Where the banner text comes from. Exactly one of the two fields may be
/// set when the table is present.
#[derive(Debug, Deserialize)]
pub struct BannerConfig {
    pub text: Option<String>,
    pub file: Option<String>,
}

const EXAMPLE_CONFIG: &str = r#"# stamp configuration
# Directory whose files receive the banner (relative to the working directory).
target = "lib"

# Decoding policy for file contents: "lossy" replaces invalid UTF-8 sequences,
# "strict" skips files that are not valid UTF-8.
decode = "lossy"

# Leave files alone when their content already starts with the banner.
skip_stamped = false

[banner]
text = """
// Copyright (c) {year}, Acme
// License terms may be found in the LICENSE file.

"""
# ...or point at a file instead of inlining the text:
# file = "HEADER.txt"
"#;

/// Load a configuration file from disk and deserialize it.
pub fn load_from_path(path: &Utf8Path) -> Result<StampConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
    let config: StampConfig =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path))?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &StampConfig) -> Result<()> {
    if let Some(banner) = &config.banner {
        match (&banner.text, &banner.file) {
            (Some(_), Some(_)) => bail!("[banner] must set either `text` or `file`, not both"),
            (None, None) => bail!("[banner] table is present but sets neither `text` nor `file`"),
            _ => {}
        }
    }
    Ok(())
}

pub fn write_example_config(path: &Utf8Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        bail!("{} already exists; rerun with --force to overwrite", path);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating directory {}", parent))?;
    }

    fs::write(path, EXAMPLE_CONFIG).with_context(|| format!("writing config {}", path))
}

pub fn set_target(path: &Utf8Path, target: &str) -> Result<()> {
    edit_document(path, |doc| {
        doc["target"] = value(target);
        Ok(())
    })
}

pub fn set_banner_file(path: &Utf8Path, banner_file: &str) -> Result<()> {
    edit_document(path, |doc| {
        if !doc.as_table().contains_key("banner") {
            doc["banner"] = Item::Table(Table::new());
        }
        let banner = doc
            .get_mut("banner")
            .and_then(Item::as_table_mut)
            .ok_or_else(|| anyhow!("config has non-table `banner` entry"))?;
        banner.remove("text");
        banner.insert("file", value(banner_file));
        Ok(())
    })
}

/// Apply an edit to the config document, preserving unrelated keys and
/// formatting. Creates the file (and parent directories) when missing.
fn edit_document(
    path: &Utf8Path,
    edit: impl FnOnce(&mut DocumentMut) -> Result<()>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating directory {}", parent))?;
    }

    let mut doc: DocumentMut = if path.exists() {
        let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
        raw.parse()
            .with_context(|| format!("parsing config {}", path))?
    } else {
        DocumentMut::new()
    };

    edit(&mut doc)?;

    fs::write(path, doc.to_string()).with_context(|| format!("writing config {}", path))
}

pub fn format_summary(config: &StampConfig) -> String {
    let mut out = String::new();
    let target = config.target.as_deref().unwrap_or("<unset>");
    let decode = match config.decode.unwrap_or_default() {
        DecodePolicy::Lossy => "lossy",
        DecodePolicy::Strict => "strict",
    };
    let banner = match &config.banner {
        Some(BannerConfig {
            text: Some(text), ..
        }) => format!("inline ({} lines)", text.lines().count()),
        Some(BannerConfig {
            file: Some(file), ..
        }) => format!("file {}", file),
        _ => "<unset>".to_string(),
    };

    let _ = writeln!(out, "Target directory: {}", target);
    let _ = writeln!(out, "Decode policy: {}", decode);
    let _ = writeln!(out, "Skip already stamped: {}", config.skip_stamped);
    let _ = writeln!(out, "Banner: {}", banner);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir() -> Utf8PathBuf {
        let mut dir = std::env::temp_dir();
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        dir.push(format!("stamp-config-test-{ts}"));
        Utf8PathBuf::from_path_buf(dir).unwrap()
    }

    #[test]
    fn example_config_parses() {
        let config: StampConfig = toml::from_str(EXAMPLE_CONFIG).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.target.as_deref(), Some("lib"));
        assert_eq!(config.decode, Some(DecodePolicy::Lossy));
        assert!(!config.skip_stamped);
        let banner = config.banner.unwrap();
        assert!(banner.text.is_some());
        assert!(banner.file.is_none());
    }

    #[test]
    fn validate_rejects_banner_with_both_sources() {
        let config: StampConfig = toml::from_str(
            r#"
[banner]
text = "x"
file = "HEADER.txt"
"#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_empty_banner_table() {
        let config: StampConfig = toml::from_str("[banner]\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn set_target_preserves_other_keys() {
        let root = unique_temp_dir();
        fs::create_dir_all(root.as_std_path()).unwrap();
        let path = root.join("config.toml");
        fs::write(
            path.as_std_path(),
            "decode = 'strict'\n\n[banner]\ntext = 'x'\n",
        )
        .unwrap();

        set_target(&path, "src").unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.target.as_deref(), Some("src"));
        assert_eq!(config.decode, Some(DecodePolicy::Strict));
        assert_eq!(config.banner.unwrap().text.as_deref(), Some("x"));

        let _ = fs::remove_dir_all(root.as_std_path());
    }

    #[test]
    fn set_banner_file_replaces_inline_text() {
        let root = unique_temp_dir();
        fs::create_dir_all(root.as_std_path()).unwrap();
        let path = root.join("config.toml");
        fs::write(path.as_std_path(), "[banner]\ntext = 'x'\n").unwrap();

        set_banner_file(&path, "HEADER.txt").unwrap();

        let config = load_from_path(&path).unwrap();
        let banner = config.banner.unwrap();
        assert_eq!(banner.file.as_deref(), Some("HEADER.txt"));
        assert!(banner.text.is_none());

        let _ = fs::remove_dir_all(root.as_std_path());
    }

    #[test]
    fn write_example_refuses_overwrite_without_force() {
        let root = unique_temp_dir();
        fs::create_dir_all(root.as_std_path()).unwrap();
        let path = root.join("config.toml");
        fs::write(path.as_std_path(), "target = 'lib'\n").unwrap();

        assert!(write_example_config(&path, false).is_err());
        write_example_config(&path, true).unwrap();
        let raw = fs::read_to_string(path.as_std_path()).unwrap();
        assert!(raw.contains("[banner]"));

        let _ = fs::remove_dir_all(root.as_std_path());
    }
}
