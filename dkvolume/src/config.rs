//! Configuration for a volume plugin server.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};
use crate::types::Transport;

/// Storage root injected into requests when none is configured.
pub const DEFAULT_ROOT: &str = "/var/lib/docker/volumes";

/// Directory the plugin host scans for plugin sockets.
pub const PLUGIN_SOCKET_DIR: &str = "/run/docker/plugins";

/// Socket path used when no listener is configured.
pub const DEFAULT_SOCKET_PATH: &str = "/run/docker/plugins/dkvolume.sock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            root: default_root(),
        }
    }
}

impl Config {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.listener.validate()?;
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "root",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

/// Where and how the plugin socket is bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub transport: Transport,
    pub address: String,
    /// Group owning the Unix socket: a group name or a numeric gid.
    /// Ignored for TCP.
    #[serde(default)]
    pub group: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::unix(DEFAULT_SOCKET_PATH)
    }
}

impl ListenerConfig {
    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            transport: Transport::Unix,
            address: path.into(),
            group: None,
        }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        Self {
            transport: Transport::Tcp,
            address: address.into(),
            group: None,
        }
    }

    /// Unix socket for the plugin called `name`.
    ///
    /// A bare name becomes `<name>.sock` in [`PLUGIN_SOCKET_DIR`], which is
    /// where the plugin host discovers it. An absolute path is used as is.
    pub fn for_plugin(name: &str) -> Self {
        if Path::new(name).is_absolute() {
            return Self::unix(name);
        }
        let path = Path::new(PLUGIN_SOCKET_DIR).join(format!("{name}.sock"));
        Self::unix(path.to_string_lossy())
    }

    /// Build a config from a transport name such as `"unix"` or `"tcp"`.
    pub fn new(transport: &str, address: impl Into<String>, group: Option<String>) -> Result<Self> {
        Ok(Self {
            transport: transport.parse()?,
            address: address.into(),
            group,
        })
    }

    /// Parse an endpoint URL: `unix:///path/to.sock` or `tcp://host:port`.
    pub fn from_endpoint(endpoint: &str) -> Result<Self> {
        let invalid = || Error::InvalidEndpoint {
            endpoint: endpoint.to_string(),
        };
        let (scheme, address) = endpoint.split_once("://").ok_or_else(invalid)?;
        if address.is_empty() {
            return Err(invalid());
        }
        Self::new(scheme, address, None)
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "listener.address",
                reason: "must not be empty",
            });
        }
        if self.transport == Transport::Tcp && self.group.is_some() {
            return Err(ConfigError::InvalidValue {
                field: "listener.group",
                reason: "only applies to unix sockets",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.root, PathBuf::from("/var/lib/docker/volumes"));
        assert_eq!(config.listener.transport, Transport::Unix);
        assert_eq!(config.listener.address, DEFAULT_SOCKET_PATH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn plugin_socket_path() {
        assert_eq!(
            ListenerConfig::for_plugin("local"),
            ListenerConfig::unix("/run/docker/plugins/local.sock")
        );
        assert_eq!(ListenerConfig::for_plugin("dkvolume"), ListenerConfig::default());
        assert_eq!(
            ListenerConfig::for_plugin("/var/run/local.sock"),
            ListenerConfig::unix("/var/run/local.sock")
        );
    }

    #[test]
    fn endpoint_unix() {
        let config = ListenerConfig::from_endpoint("unix:///run/docker/plugins/local.sock").unwrap();
        assert_eq!(config, ListenerConfig::unix("/run/docker/plugins/local.sock"));
    }

    #[test]
    fn endpoint_tcp() {
        let config = ListenerConfig::from_endpoint("tcp://127.0.0.1:8080").unwrap();
        assert_eq!(config, ListenerConfig::tcp("127.0.0.1:8080"));
    }

    #[test]
    fn endpoint_unknown_scheme() {
        let result = ListenerConfig::from_endpoint("udp://127.0.0.1:8080");
        assert!(matches!(result, Err(Error::UnsupportedTransport { .. })));
    }

    #[test]
    fn endpoint_malformed() {
        for endpoint in ["/run/plugin.sock", "unix://", ""] {
            let result = ListenerConfig::from_endpoint(endpoint);
            assert!(
                matches!(result, Err(Error::InvalidEndpoint { .. })),
                "{endpoint} should be rejected"
            );
        }
    }

    #[test]
    fn tcp_rejects_group() {
        let config = ListenerConfig::tcp("127.0.0.1:0").with_group("docker");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "listener.group",
                ..
            })
        ));
    }

    #[test]
    fn load_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dkvolume.toml");
        std::fs::write(
            &path,
            r#"
root = "/srv/volumes"

[listener]
transport = "unix"
address = "/run/docker/plugins/local.sock"
group = "docker"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/volumes"));
        assert_eq!(
            config.listener,
            ListenerConfig::unix("/run/docker/plugins/local.sock").with_group("docker")
        );
    }

    #[test]
    fn load_toml_defaults_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dkvolume.toml");
        std::fs::write(
            &path,
            "[listener]\ntransport = \"tcp\"\naddress = \"127.0.0.1:9000\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.root, PathBuf::from(DEFAULT_ROOT));
        assert_eq!(config.listener, ListenerConfig::tcp("127.0.0.1:9000"));
    }

    #[test]
    fn load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/dkvolume.toml"));
        assert!(matches!(result, Err(Error::Config(ConfigError::ReadError(_)))));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dkvolume.toml");
        std::fs::write(
            &path,
            "[listener]\ntransport = \"tcp\"\naddress = \"127.0.0.1:9000\"\ngroup = \"docker\"\n",
        )
        .unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue {
                field: "listener.group",
                ..
            })
        ));
        assert!(err.to_string().starts_with("configuration error: "));
    }

    #[test]
    fn load_rejects_unknown_transport() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dkvolume.toml");
        std::fs::write(&path, "[listener]\ntransport = \"udp\"\naddress = \"x\"\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(Error::Config(ConfigError::ParseError(_)))
        ));
    }
}
