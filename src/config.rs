//! Server configuration (SPEC_FULL.md §6).
//!
//! Grounded on the teacher's `main.rs` pattern of preferring `CLARIUM_*`
//! environment variables with string fallbacks, generalized here into a
//! loader function: a JSON config file (`-cfg <file>`) supplies defaults,
//! and `VDMS_*` environment variables override individual fields, because
//! this crate's configuration surface (every key in spec.md §6) is large
//! enough to warrant a struct rather than scattered `std::env::var` calls.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

fn default_port() -> u16 {
    55555
}
fn default_max_clients() -> usize {
    100
}
fn default_db_root() -> PathBuf {
    PathBuf::from("./vdms_db")
}
fn default_autodelete_interval_s() -> u64 {
    600
}
fn default_autoreplicate_interval() -> u64 {
    0
}
fn default_unit() -> String {
    "seconds".to_string()
}
fn default_storage_type() -> String {
    "local".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hard upper bound per spec.md §6: the accept loop never honors a
    /// value above 500 regardless of what the config file says.
    #[serde(default = "default_max_clients")]
    pub max_simultaneous_clients: usize,

    #[serde(default = "default_db_root")]
    pub db_root_path: PathBuf,
    pub blob_path: Option<PathBuf>,
    pub images_path: Option<PathBuf>,
    pub videos_path: Option<PathBuf>,
    pub descriptors_path: Option<PathBuf>,
    pub tmp_path: Option<PathBuf>,

    #[serde(default = "default_autodelete_interval_s")]
    pub autodelete_interval_s: u64,
    #[serde(default = "default_autoreplicate_interval")]
    pub autoreplicate_interval: u64,
    #[serde(default = "default_unit")]
    pub unit: String,

    #[serde(default)]
    pub backup_flag: bool,
    pub backup_path: Option<PathBuf>,

    #[serde(default = "default_storage_type")]
    pub storage_type: String,
    pub aws_log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            max_simultaneous_clients: default_max_clients(),
            db_root_path: default_db_root(),
            blob_path: None,
            images_path: None,
            videos_path: None,
            descriptors_path: None,
            tmp_path: None,
            autodelete_interval_s: default_autodelete_interval_s(),
            autoreplicate_interval: default_autoreplicate_interval(),
            unit: default_unit(),
            backup_flag: false,
            backup_path: None,
            storage_type: default_storage_type(),
            aws_log_level: None,
        }
    }
}

impl Config {
    /// Cap applied after loading, matching spec.md §6's hard 500-client
    /// ceiling regardless of what the config file or environment ask for.
    pub const MAX_SIMULTANEOUS_CLIENTS_CEILING: usize = 500;

    pub fn blob_path(&self) -> PathBuf {
        self.blob_path.clone().unwrap_or_else(|| self.db_root_path.join("blobs"))
    }
    pub fn images_path(&self) -> PathBuf {
        self.images_path.clone().unwrap_or_else(|| self.db_root_path.join("images"))
    }
    pub fn videos_path(&self) -> PathBuf {
        self.videos_path.clone().unwrap_or_else(|| self.db_root_path.join("videos"))
    }
    pub fn descriptors_path(&self) -> PathBuf {
        self.descriptors_path.clone().unwrap_or_else(|| self.db_root_path.join("descriptors"))
    }
    pub fn tmp_path(&self) -> PathBuf {
        self.tmp_path.clone().unwrap_or_else(|| self.db_root_path.join("tmp"))
    }

    /// Load a `Config` from a JSON file, then apply any `VDMS_*`
    /// environment variable overrides, then clamp
    /// `max_simultaneous_clients` to the hard ceiling.
    pub fn load(path: Option<&Path>) -> Result<Config, AppError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(AppError::from)?;
                serde_json::from_str(&text)
                    .map_err(|e| AppError::storage("bad_config", format!("failed to parse {}: {e}", path.display())))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        config.max_simultaneous_clients = config.max_simultaneous_clients.min(Self::MAX_SIMULTANEOUS_CLIENTS_CEILING);
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VDMS_PORT") {
            if let Ok(port) = v.parse() {
                self.port = port;
            }
        }
        if let Ok(v) = std::env::var("VDMS_MAX_SIMULTANEOUS_CLIENTS") {
            if let Ok(n) = v.parse() {
                self.max_simultaneous_clients = n;
            }
        }
        if let Ok(v) = std::env::var("VDMS_DB_ROOT_PATH") {
            self.db_root_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VDMS_STORAGE_TYPE") {
            self.storage_type = v;
        }
        if let Ok(v) = std::env::var("VDMS_BACKUP_PATH") {
            self.backup_path = Some(PathBuf::from(v));
        }
    }

    /// Reject configurations this build cannot actually serve, per
    /// SPEC_FULL.md §6: `storage_type = "aws"` is parsed but has no
    /// backing client in this crate, so fail loudly at startup instead of
    /// silently behaving like `local`.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.storage_type != "local" && self.storage_type != "aws" {
            return Err(AppError::storage("bad_config", format!("unknown storage_type '{}'", self.storage_type)));
        }
        if self.storage_type == "aws" {
            return Err(AppError::storage(
                "unsupported_storage_backend",
                "storage_type 'aws' has no backing client in this build".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parsed `-cfg <file>` / `-restore <archive>` process arguments
/// (SPEC_FULL.md §2.1).
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub restore_archive: Option<PathBuf>,
}

impl CliArgs {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> CliArgs {
        let mut out = CliArgs::default();
        let mut iter = args.into_iter().peekable();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-cfg" => out.config_path = iter.next().map(PathBuf::from),
                "-restore" => out.restore_archive = iter.next().map(PathBuf::from),
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.port, 55555);
        assert_eq!(config.storage_type, "local");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn aws_storage_type_is_rejected_at_validate() {
        let mut config = Config::default();
        config.storage_type = "aws".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_clients_is_clamped_to_ceiling() {
        let mut config = Config::default();
        config.max_simultaneous_clients = 10_000;
        assert!(config.max_simultaneous_clients > Config::MAX_SIMULTANEOUS_CLIENTS_CEILING);
        // load() performs the clamp; here we exercise the same logic directly.
        config.max_simultaneous_clients = config.max_simultaneous_clients.min(Config::MAX_SIMULTANEOUS_CLIENTS_CEILING);
        assert_eq!(config.max_simultaneous_clients, Config::MAX_SIMULTANEOUS_CLIENTS_CEILING);
    }

    #[test]
    fn cli_args_parses_flags() {
        let args = CliArgs::parse(vec!["-cfg".to_string(), "vdms.json".to_string(), "-restore".to_string(), "backup.tar".to_string()]);
        assert_eq!(args.config_path, Some(PathBuf::from("vdms.json")));
        assert_eq!(args.restore_archive, Some(PathBuf::from("backup.tar")));
    }
}
