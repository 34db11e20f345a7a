//! Scan configuration loaded from JSON.
//!
//! ```json
//! {
//!   "options": { "wayland_protocols": "/usr/share/wayland-protocols" },
//!   "custom_protocols": ["protocol/river-status-unstable-v1.xml"],
//!   "system_protocols": ["stable/xdg-shell/xdg-shell.xml"],
//!   "generate": ["wl_compositor 4", "wl_seat 7", "xdg_wm_base 2"]
//! }
//! ```
//!
//! `options` holds [`ScannerOptions`] fields. Unknown keys are rejected at
//! both levels, so a misspelled key fails to load instead of being ignored.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigurationError, Error, Result};
use crate::graph::{ArtifactHandle, BuildGraph};
use crate::request::Directive;
use crate::scanner::{Scanner, ScannerOptions};

/// Protocols and directives to register on a scanner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    #[serde(default)]
    pub options: ScannerOptions,

    /// Protocol files used by path.
    #[serde(default)]
    pub custom_protocols: Vec<PathBuf>,

    /// Protocol files relative to the `wayland-protocols` directory.
    #[serde(default)]
    pub system_protocols: Vec<PathBuf>,

    /// `"<interface> <version>"` entries.
    #[serde(default)]
    pub generate: Vec<String>,
}

impl ScanConfig {
    /// Load a config file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: ScanConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Parse every directive without touching a scanner.
    pub fn directives(&self) -> std::result::Result<Vec<Directive>, ConfigurationError> {
        self.generate.iter().map(|d| d.parse()).collect()
    }

    /// Register custom protocols, then system protocols, then directives.
    ///
    /// Directives are validated before anything is registered, so a bad
    /// entry leaves the scanner untouched.
    pub fn apply(
        &self,
        scanner: &mut Scanner,
        graph: &mut BuildGraph,
    ) -> std::result::Result<Vec<ArtifactHandle>, ConfigurationError> {
        let directives = self.directives()?;

        let mut side_artifacts = Vec::new();
        for path in &self.custom_protocols {
            side_artifacts.push(scanner.add_custom_protocol(graph, path.clone()));
        }
        for path in &self.system_protocols {
            side_artifacts.push(scanner.add_system_protocol(graph, path.clone()));
        }
        for directive in directives {
            scanner.generate(directive.interface, directive.version);
        }
        Ok(side_artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "options": {
                "wayland_xml": "/opt/wayland/wayland.xml",
                "generator": "/opt/bin/bindgen"
            },
            "custom_protocols": ["protocol/river-status-unstable-v1.xml"],
            "system_protocols": ["stable/xdg-shell/xdg-shell.xml"],
            "generate": ["wl_compositor 4", "xdg_wm_base 2"]
        }"#;
        let config: ScanConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.options.wayland_xml.as_deref(),
            Some(Path::new("/opt/wayland/wayland.xml"))
        );
        assert_eq!(config.options.generator, PathBuf::from("/opt/bin/bindgen"));
        assert_eq!(config.options.side_verb, "private-code");
        assert_eq!(config.custom_protocols.len(), 1);
        assert_eq!(config.system_protocols.len(), 1);
        assert_eq!(
            config.directives().unwrap(),
            vec![
                Directive::try_new("wl_compositor", 4).unwrap(),
                Directive::try_new("xdg_wm_base", 2).unwrap()
            ]
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: ScanConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.options, ScannerOptions::default());
        assert!(config.generate.is_empty());
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        let top = r#"{ "system_protocol": ["stable/xdg-shell/xdg-shell.xml"] }"#;
        let err = serde_json::from_str::<ScanConfig>(top).unwrap_err();
        assert!(err.to_string().contains("unknown field `system_protocol`"));

        let nested = r#"{ "options": { "side_extention": "cc" } }"#;
        let err = serde_json::from_str::<ScanConfig>(nested).unwrap_err();
        assert!(err.to_string().contains("unknown field `side_extention`"));

        let flat = r#"{ "generator": "/opt/bin/bindgen" }"#;
        assert!(serde_json::from_str::<ScanConfig>(flat).is_err());
    }

    #[test]
    fn load_reports_unknown_keys() {
        let path = std::env::temp_dir().join(format!(
            "wayland-scan-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "generat": ["wl_seat 5"] }"#).unwrap();
        let result = ScanConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn malformed_directive_is_reported() {
        let config = ScanConfig {
            generate: vec!["wl_seat 5".to_string(), "wl_seat".to_string()],
            ..ScanConfig::default()
        };
        let err = config.directives().unwrap_err();
        assert!(err.to_string().contains("'wl_seat'"));
    }
}
