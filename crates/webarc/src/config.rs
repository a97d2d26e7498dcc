use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Full server configuration, loaded from a TOML file. Every field has a
/// default so a missing file yields a runnable local setup.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub content: ContentConfig,
    pub cgi: CgiSection,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentConfig {
    pub bind: SocketAddr,
    pub htdocs_root: PathBuf,
    /// Subdirectories of the htdocs tree that shadow it, in win order.
    pub overrides: Vec<String>,
    pub script_root: PathBuf,
    pub script_extensions: Vec<String>,
    pub index_files: Vec<String>,
    pub cors: bool,
    pub external_sources: Vec<ExternalSourceConfig>,
    pub external_timeout_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 22500)),
            htdocs_root: PathBuf::from("htdocs"),
            overrides: Vec::new(),
            script_root: PathBuf::from("cgi-bin"),
            script_extensions: vec!["php".into()],
            index_files: vec![
                "index.html".into(),
                "index.htm".into(),
                "index.php".into(),
                "index.swf".into(),
            ],
            cors: false,
            external_sources: Vec::new(),
            external_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalSourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub mad4fp: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CgiSection {
    pub interpreter: PathBuf,
    pub timeout_secs: u64,
    pub kill_grace_secs: u64,
    pub max_stdout: usize,
    pub max_stderr: usize,
}

impl Default for CgiSection {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("php-cgi"),
            timeout_secs: 30,
            kill_grace_secs: 2,
            max_stdout: 16 * 1024 * 1024,
            max_stderr: 64 * 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub bind: SocketAddr,
    /// Root every stored relative path resolves against.
    pub install_root: PathBuf,
    /// Where imported packages land, under the install root.
    pub content_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub db_path: PathBuf,
    /// Base URLs package files are fetched from, in fallback order.
    pub package_sources: Vec<String>,
    pub registry_grace_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 22501)),
            install_root: PathBuf::from("."),
            content_dir: PathBuf::from("games"),
            staging_dir: PathBuf::from("staging"),
            db_path: PathBuf::from("webarc.db"),
            package_sources: Vec::new(),
            registry_grace_secs: 5,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.content.external_timeout_secs)
    }

    pub fn registry_grace(&self) -> Duration {
        Duration::from_secs(self.archive.registry_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.content.bind.port(), 22500);
        assert_eq!(config.content.index_files[0], "index.html");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webarc.toml");
        std::fs::write(
            &path,
            r#"
[content]
bind = "0.0.0.0:8080"
cors = true

[[content.external_sources]]
base_url = "http://mirror.example"

[archive]
package_sources = ["http://packs.example"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.content.bind.port(), 8080);
        assert!(config.content.cors);
        assert_eq!(config.content.external_sources.len(), 1);
        assert!(!config.content.external_sources[0].mad4fp);
        assert_eq!(config.archive.bind.port(), 22501);
        assert_eq!(config.archive.package_sources.len(), 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webarc.toml");
        std::fs::write(&path, "[content]\nbnid = \"x\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
