//! Server configuration file.
//!
//! ```toml
//! [general]
//! server_port = 8055
//! listen_address = "::"
//! users_file = "open8055.users"
//!
//! [access]
//! connect = """
//! 127.0.0.1/32    all     trust
//! 0.0.0.0/0       all     deny
//! """
//! default = """
//! 192.168.1.0/24  all     md5
//! 0.0.0.0/0       all     deny
//! """
//!
//! [access.cards]
//! "0" = "0.0.0.0/0 all deny"
//! ```
//!
//! Every key is optional. Missing access lists trust loopback clients and
//! deny everybody else.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use open8055_access::access::LOCAL_ONLY_RULES;
use open8055_access::{AccessList, AccessPolicy, UserFile};
use open8055_core::CardId;
use open8055_core::constants::DEFAULT_SERVER_PORT;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;

/// System wide configuration file.
pub const SYSTEM_CONFIG: &str = "/usr/local/etc/open8055.toml";

/// Configuration file name looked up next to the executable.
pub const CONFIG_FILE_NAME: &str = "open8055.toml";

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_users_file() -> PathBuf {
    PathBuf::from("open8055.users")
}

fn default_rules() -> String {
    LOCAL_ONLY_RULES.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default = "default_port")]
    pub server_port: u16,
    /// Bind only this address. Unset means dual-stack with IPv4 fallback.
    #[serde(default)]
    pub listen_address: Option<IpAddr>,
    /// Relative paths are resolved against the configuration file.
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            server_port: default_port(),
            listen_address: None,
            users_file: default_users_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    #[serde(default = "default_rules")]
    pub connect: String,
    /// `LIST` rules; `connect` applies when unset.
    #[serde(default)]
    pub list: Option<String>,
    /// `OPEN` rules for cards without an entry in `cards`.
    #[serde(default = "default_rules")]
    pub default: String,
    /// `OPEN` rules per card number.
    #[serde(default)]
    pub cards: BTreeMap<String, String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            connect: default_rules(),
            list: None,
            default: default_rules(),
            cards: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub access: AccessConfig,
    /// File this configuration was read from.
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl ServerConfig {
    /// Parse configuration text not backed by a file.
    ///
    /// # Errors
    /// Returns `Parse` for invalid TOML or unknown keys.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Read a configuration file.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read and `Parse` if it is not a
    /// valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.source = Some(path.to_path_buf());
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load `explicit` if given, otherwise the first existing file of
    /// [`default_locations`], otherwise the built-in defaults.
    ///
    /// # Errors
    /// An explicit file must exist. Any file found must parse.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_locations().into_iter().find(|p| p.exists()) {
            Some(path) => Self::load(path),
            None => {
                debug!("no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Read the same file again. Without a file, the defaults.
    ///
    /// # Errors
    /// Same as [`load`](Self::load).
    pub fn reload(&self) -> Result<Self, ConfigError> {
        match &self.source {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Absolute or config-relative path of the users file.
    #[must_use]
    pub fn users_path(&self) -> PathBuf {
        let file = &self.general.users_file;
        if file.is_absolute() {
            return file.clone();
        }
        let base = match &self.source {
            Some(source) => source.parent().map(Path::to_path_buf),
            None => executable_dir(),
        };
        match base {
            Some(dir) => dir.join(file),
            None => file.clone(),
        }
    }

    /// Addresses to try binding, in order.
    #[must_use]
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        let port = self.general.server_port;
        match self.general.listen_address {
            Some(addr) => vec![SocketAddr::new(addr, port)],
            None => vec![
                SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            ],
        }
    }

    /// Build the access policy of this configuration.
    ///
    /// # Errors
    /// Returns `Access` for an unparsable list and `InvalidCard` for a
    /// card entry that is not a card number.
    pub fn access_policy(&self) -> Result<AccessPolicy, ConfigError> {
        let access = &self.access;
        let mut policy = AccessPolicy::new(UserFile::new(self.users_path()))
            .with_connect(parse_list("connect", &access.connect)?)
            .with_default(parse_list("default", &access.default)?);
        if let Some(list) = &access.list {
            policy = policy.with_list(parse_list("list", list)?);
        }
        for (card, rules) in &access.cards {
            let id: CardId = card
                .parse()
                .map_err(|_| ConfigError::InvalidCard(card.clone()))?;
            policy = policy.with_card(id, parse_list(&format!("cards.{card}"), rules)?);
        }
        Ok(policy)
    }
}

fn parse_list(name: &str, text: &str) -> Result<AccessList, ConfigError> {
    text.parse().map_err(|source| ConfigError::Access {
        list: name.to_string(),
        source,
    })
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Configuration files looked for when none is given.
#[must_use]
pub fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Some(dir) = executable_dir() {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    paths
}
