use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use sugar_validate::MacroOverrides;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "sugarlint.json";

/// Top-level sugarlint.json schema.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintConfig {
    /// Descriptors for macros the validator cannot discover on its own.
    #[serde(default)]
    pub macros: MacroOverrides,

    /// Hide "Unrecognized macro" errors in stories whose macro or widget
    /// declarations could not all be resolved.
    #[serde(default)]
    pub suppress_when_unresolved: bool,

    #[serde(default = "default_show_infos")]
    pub show_infos: bool,

    /// File extensions picked up when walking directories.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            macros: MacroOverrides::new(),
            suppress_when_unresolved: false,
            show_infos: default_show_infos(),
            extensions: default_extensions(),
        }
    }
}

fn default_show_infos() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec!["html".to_string(), "htm".to_string()]
}

impl LintConfig {
    /// `true` if `path` has one of the configured extensions.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// Load config from an explicit path, or from sugarlint.json in the working
/// directory. A missing default file yields defaults; a missing explicit
/// file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<LintConfig> {
    let config_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(CONFIG_FILE);
            if !path.exists() {
                return Ok(LintConfig::default());
            }
            path
        }
    };

    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let config = parse_config(&raw)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;
    log::debug!(
        "loaded {} ({} macro overrides)",
        config_path.display(),
        config.macros.len()
    );
    Ok(config)
}

/// Parse a config document and check its macro overrides.
pub fn parse_config(raw: &str) -> Result<LintConfig> {
    let mut config: LintConfig = serde_json::from_str(raw)?;
    config.macros = sugar_validate::normalize_overrides(std::mem::take(&mut config.macros))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "macros": {
                "dialog": { "closed": true },
                "choice-item": { "ctx": [{ "main": "choices", "ordered": false }] },
                "endquest": { "replacend": "quest" }
            },
            "suppressWhenUnresolved": true,
            "showInfos": false,
            "extensions": ["html", "xhtml"]
        }"#;

        let config = parse_config(json).unwrap();
        assert_eq!(config.macros.len(), 3);
        assert!(config.macros["dialog"].closed);
        assert_eq!(config.macros["dialog"].name, "dialog");
        assert_eq!(config.macros["choice-item"].contexts[0].parent, "choices");
        assert_eq!(config.macros["endquest"].replaces_as.as_deref(), Some("quest"));
        assert!(config.suppress_when_unresolved);
        assert!(!config.show_infos);
        assert_eq!(config.extensions, vec!["html", "xhtml"]);
    }

    #[test]
    fn test_defaults() {
        let config = parse_config("{}").unwrap();
        assert!(config.macros.is_empty());
        assert!(!config.suppress_when_unresolved);
        assert!(config.show_infos);
        assert_eq!(config.extensions, vec!["html", "htm"]);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let json = r#"{ "macros": { "bad": { "ctx": [{ "main": "" }] } } }"#;
        assert!(parse_config(json).is_err());
    }

    #[test]
    fn test_extension_filter() {
        let config = LintConfig::default();
        assert!(config.accepts(Path::new("story/index.HTML")));
        assert!(config.accepts(Path::new("a.htm")));
        assert!(!config.accepts(Path::new("notes.md")));
        assert!(!config.accepts(Path::new("Makefile")));
    }
}
