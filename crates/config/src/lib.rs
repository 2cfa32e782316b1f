//! Configuration for the sfs client.
//!
//! Values are layered, later layers winning:
//!
//! 1. Built-in defaults.
//! 2. A config file: the one given on the command line, otherwise
//!    `<config dir>/sfs/config.toml` if it exists. TOML, YAML and JSON are
//!    supported, chosen by extension.
//! 3. Environment variables prefixed with `SFS_`, using `__` for nesting
//!    (`SFS_BATCH__MAX_CAPACITY=5000000`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::{ProjectDirs, UserDirs};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use sfs_sync::DEFAULT_MAX_CAPACITY;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SFS_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Identity the local tree and its sync index belong to
    pub owner: String,
    /// Directory being synchronised; must be absolute
    pub root: PathBuf,
    /// SQLite metadata database
    pub database: PathBuf,
    /// Where saved sync indexes live
    pub index_dir: PathBuf,
    pub batch: BatchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Upper bound on the bytes sent in one transfer round
    pub max_capacity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub endpoint: String,
    /// Connect timeout, and the base of each request's deadline. Uploads get
    /// extra time in proportion to their size.
    pub timeout_secs: u64,
}
impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("", "", "sfs").map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_default();
        let root = UserDirs::new().map(|dirs| dirs.home_dir().join("sfs")).unwrap_or_default();
        let owner = std::env::var("USER").unwrap_or_else(|_| "sfs".to_string());
        Self {
            owner,
            root,
            database: data_dir.join("sfs.db"),
            index_dir: data_dir.join("indexes"),
            batch: BatchConfig { max_capacity: DEFAULT_MAX_CAPACITY },
            server: ServerConfig {
                endpoint: "http://localhost:8080".to_string(),
                timeout_secs: 30,
            },
        }
    }
}

impl Config {
    /// Default config file location, `<config dir>/sfs/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sfs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load and validate the layered configuration.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = Self::merge_file(figment, path)?;
            },
            None => {
                if let Some(path) = Self::default_path().filter(|p| p.is_file()) {
                    figment = Self::merge_file(figment, &path)?;
                }
            },
        }
        let config: Config = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(owner = %config.owner, root = %config.root.display(), "Loaded configuration");
        Ok(config)
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        tracing::debug!(path = %path.display(), "Reading config file");
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.root.is_absolute() {
            exn::bail!(ErrorKind::Invalid("root must be an absolute path"));
        }
        if self.batch.max_capacity == 0 {
            exn::bail!(ErrorKind::Invalid("batch.max_capacity must be greater than zero"));
        }
        if self.owner.is_empty() {
            exn::bail!(ErrorKind::Invalid("owner must not be empty"));
        }
        if sfs_sync::validate_owner(&self.owner).is_err() {
            exn::bail!(ErrorKind::Invalid("owner may only contain letters, digits, '-', '_', '.' and '@'"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn valid() -> Config {
        Config {
            owner: "alice".to_string(),
            root: PathBuf::from("/srv/sync/alice"),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.batch.max_capacity, sfs_sync::DEFAULT_MAX_CAPACITY);
        assert_eq!(config.server.endpoint, "http://localhost:8080");
        assert_eq!(config.server.timeout(), Duration::from_secs(30));
    }

    #[rstest]
    #[case::relative_root(Config { root: PathBuf::from("relative/dir"), ..valid() })]
    #[case::zero_capacity(Config { batch: BatchConfig { max_capacity: 0 }, ..valid() })]
    #[case::empty_owner(Config { owner: String::new(), ..valid() })]
    #[case::owner_with_path(Config { owner: "../../tmp/x".to_string(), ..valid() })]
    fn test_validate_rejects(#[case] config: Config) {
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_validate_accepts() {
        valid().validate().unwrap();
    }

    #[test]
    fn test_file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sfs.toml",
                r#"
                    owner = "alice"
                    root = "/srv/sync/alice"

                    [batch]
                    max_capacity = 5000
                "#,
            )?;
            jail.set_env("SFS_SERVER__ENDPOINT", "https://sync.example.org");
            jail.set_env("SFS_BATCH__MAX_CAPACITY", "7000");
            let config = Config::load(Some(Path::new("sfs.toml"))).unwrap();
            assert_eq!(config.owner, "alice");
            assert_eq!(config.root, PathBuf::from("/srv/sync/alice"));
            assert_eq!(config.batch.max_capacity, 7000);
            assert_eq!(config.server.endpoint, "https://sync.example.org");
            assert_eq!(config.server.timeout_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file() {
        Jail::expect_with(|jail| {
            jail.create_file("sfs.yaml", "owner: bob\nroot: /home/bob/sync\nserver:\n  timeout_secs: 5\n")?;
            let config = Config::load(Some(Path::new("sfs.yaml"))).unwrap();
            assert_eq!(config.owner, "bob");
            assert_eq!(config.server.timeout_secs, 5);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|_jail| {
            let err = Config::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("sfs.ini", "owner = alice")?;
            let err = Config::load(Some(Path::new("sfs.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_contents() {
        Jail::expect_with(|jail| {
            jail.create_file("sfs.toml", "root = \"relative\"\nowner = \"alice\"")?;
            let err = Config::load(Some(Path::new("sfs.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }
}
