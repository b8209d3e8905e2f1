use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Static shell and WISP tunnel endpoint")]
pub struct Config {
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides config file and PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host address to bind
    #[arg(long)]
    pub host: Option<String>,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Static asset settings
    #[serde(default)]
    pub assets: AssetSettings,

    /// WISP tunnel settings
    #[serde(default)]
    pub wisp: WispSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Static asset settings
///
/// The server prefers `dist_dir` (the production build output) and falls
/// back to `public_dir` when no build output exists. Additional vendor
/// bundles are mounted under their own URL prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSettings {
    /// Production build output directory
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,

    /// Development asset directory (also holds 404.html)
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    /// Prefix-mounted vendor asset directories
    #[serde(default = "default_mounts")]
    pub mounts: Vec<Mount>,
}

/// A static directory served under a URL prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    /// URL prefix, e.g. "/scram/"
    pub prefix: String,
    /// Directory to serve
    pub dir: PathBuf,
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_mounts() -> Vec<Mount> {
    vec![
        Mount {
            prefix: "/scram/".to_string(),
            dir: PathBuf::from("vendor/scramjet"),
        },
        Mount {
            prefix: "/epoxy/".to_string(),
            dir: PathBuf::from("vendor/epoxy"),
        },
        Mount {
            prefix: "/baremux/".to_string(),
            dir: PathBuf::from("vendor/baremux"),
        },
    ]
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            dist_dir: default_dist_dir(),
            public_dir: default_public_dir(),
            mounts: default_mounts(),
        }
    }
}

impl AssetSettings {
    /// The asset root requests are served from: the build output when it
    /// exists, the development directory otherwise.
    pub fn active_root(&self) -> &PathBuf {
        if self.dist_dir.is_dir() {
            &self.dist_dir
        } else {
            &self.public_dir
        }
    }
}

/// WISP tunnel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WispSettings {
    /// Allow clients to open UDP streams
    #[serde(default)]
    pub allow_udp_streams: bool,

    /// Destination hostname patterns (regex) that must not be dialed
    #[serde(default)]
    pub hostname_blacklist: Vec<String>,

    /// Per-stream flow control buffer size, in packets
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,
}

fn default_buffer_size() -> u32 {
    128
}

impl Default for WispSettings {
    fn default() -> Self {
        Self {
            allow_udp_streams: false,
            hostname_blacklist: Vec::new(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // An explicitly given path must exist
        if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file: {:?}", p))?;
            return toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", p));
        }

        // Otherwise probe the default location
        let default_path = PathBuf::from("wayport.toml");
        if default_path.exists() {
            let content = std::fs::read_to_string(&default_path)
                .with_context(|| format!("Failed to read config file: {:?}", default_path))?;
            return toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", default_path));
        }

        Ok(Self::default())
    }

    /// Apply the PORT environment variable (config file < env < CLI)
    ///
    /// A value that does not parse as a port is ignored with a warning,
    /// leaving the configured value in place.
    pub fn merge_env(&mut self) {
        match std::env::var("PORT") {
            Ok(value) if !value.trim().is_empty() => match value.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => {
                    tracing::warn!(
                        value = %value,
                        fallback = self.server.port,
                        "ignoring non-numeric PORT"
                    );
                }
            },
            _ => {}
        }
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
    }

    /// Validate and normalize settings values
    ///
    /// Mount prefixes are normalized to "/name" form and blacklist
    /// patterns are checked to compile as regexes.
    pub fn validate(&mut self) -> Result<()> {
        for mount in &mut self.assets.mounts {
            if !mount.prefix.starts_with('/') {
                mount.prefix.insert(0, '/');
            }
            while mount.prefix.len() > 1 && mount.prefix.ends_with('/') {
                mount.prefix.pop();
            }
            if mount.prefix == "/" {
                anyhow::bail!("mount prefix must name a subpath, got \"/\"");
            }
        }

        for pattern in &self.wisp.hostname_blacklist {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid blacklist pattern: {}", pattern))?;
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            assets: AssetSettings::default(),
            wisp: WispSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert!(!settings.wisp.allow_udp_streams);
        assert_eq!(settings.assets.mounts.len(), 3);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [server]
            port = 3000

            [wisp]
            allow_udp_streams = true
            hostname_blacklist = ["example\\.com"]
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(settings.wisp.allow_udp_streams);
        assert_eq!(settings.wisp.hostname_blacklist.len(), 1);
    }

    #[test]
    fn test_port_env_override() {
        temp_env::with_var("PORT", Some("9000"), || {
            let mut settings = Settings::default();
            settings.merge_env();
            assert_eq!(settings.server.port, 9000);
        });
    }

    #[test]
    fn test_port_env_invalid_falls_back() {
        temp_env::with_var("PORT", Some("not-a-port"), || {
            let mut settings = Settings::default();
            settings.merge_env();
            assert_eq!(settings.server.port, 8080);
        });
    }

    #[test]
    fn test_port_env_empty_is_unset() {
        temp_env::with_var("PORT", Some("  "), || {
            let mut settings = Settings::default();
            settings.merge_env();
            assert_eq!(settings.server.port, 8080);
        });
    }

    #[test]
    fn test_cli_beats_env() {
        temp_env::with_var("PORT", Some("9000"), || {
            let mut settings = Settings::default();
            settings.merge_env();
            let cli = Config {
                debug: false,
                config: None,
                port: Some(4000),
                host: None,
            };
            settings.merge_cli(&cli);
            assert_eq!(settings.server.port, 4000);
        });
    }

    #[test]
    fn test_validate_normalizes_mount_prefixes() {
        let mut settings = Settings::default();
        settings.assets.mounts = vec![Mount {
            prefix: "scram/".to_string(),
            dir: PathBuf::from("vendor/scramjet"),
        }];
        settings.validate().unwrap();
        assert_eq!(settings.assets.mounts[0].prefix, "/scram");
    }

    #[test]
    fn test_validate_rejects_bad_blacklist() {
        let mut settings = Settings::default();
        settings.wisp.hostname_blacklist = vec!["(unclosed".to_string()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_active_root_falls_back_to_public() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.assets.dist_dir = dir.path().join("dist");
        settings.assets.public_dir = dir.path().join("public");
        std::fs::create_dir_all(&settings.assets.public_dir).unwrap();

        assert_eq!(settings.assets.active_root(), &settings.assets.public_dir);

        std::fs::create_dir_all(&settings.assets.dist_dir).unwrap();
        assert_eq!(settings.assets.active_root(), &settings.assets.dist_dir);
    }
}
