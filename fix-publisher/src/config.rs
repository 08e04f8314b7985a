use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use argh::FromArgs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use ublox_fix::{AcquisitionConfig, UbxCommand};

use crate::PublisherError;

/// Shortest read timeout handed to the acquisition loop, in milliseconds
const MIN_TIMEOUT_MS: u64 = 10;

#[derive(FromArgs, Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Publish position fixes from a u-blox receiver
pub struct PublisherCfg {
    /// serial device
    #[argh(option, default = "String::from(\"/dev/ttyACM0\")")]
    pub serial_port: String,
    /// baud rate
    #[argh(option, default = "38400")]
    pub baud_rate: u32,
    /// read timeout in milliseconds
    #[argh(option, default = "1000")]
    pub timeout: u64,
    /// pause after the rate command in milliseconds
    #[argh(option, default = "1000")]
    pub settle: u64,
    /// label attached to each published fix
    #[argh(option, default = "String::from(\"gps\")")]
    pub frame_id: String,
    /// also store fixes in hourly files under this directory
    #[argh(option)]
    pub save_dir: Option<PathBuf>,
    /// gzip each completed hourly file
    #[argh(switch)]
    #[serde(default)]
    pub compress: bool,
    /// persist this configuration as the default
    #[argh(switch)]
    #[serde(skip)]
    pub save_config: bool,
    /// use the persisted configuration instead of the command line
    #[argh(switch)]
    #[serde(skip)]
    pub load_config: bool,
}

impl PublisherCfg {
    /// Settings of the acquisition loop. The read timeout is at least 10 ms,
    /// a zero timeout would spin the loop on empty reads.
    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            read_timeout: Duration::from_millis(self.timeout.max(MIN_TIMEOUT_MS)),
            settle_delay: Duration::from_millis(self.settle),
            frame_id: self.frame_id.clone(),
            command: UbxCommand::rate_10hz(),
        }
    }

    /// Store the configuration in the default location
    pub fn store_default(&self) -> Result<PathBuf, PublisherError> {
        let path = get_default_path();
        self.store(&path)?;
        Ok(path)
    }

    /// Load the configuration from the default location
    pub fn load_default() -> Result<Self, PublisherError> {
        Self::load(&get_default_path())
    }

    fn store(&self, path: &Path) -> Result<(), PublisherError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn load(path: &Path) -> Result<Self, PublisherError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

fn get_default_path() -> PathBuf {
    let mut path = if let Some(path) = ProjectDirs::from("", "", "fix_publisher") {
        path.config_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    };
    path.push("config.json");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> PublisherCfg {
        PublisherCfg::from_args(&["fix-publisher"], args).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.serial_port, "/dev/ttyACM0");
        assert_eq!(cfg.baud_rate, 38400);
        assert_eq!(cfg.frame_id, "gps");
        assert_eq!(cfg.save_dir, None);
        let acq = cfg.acquisition();
        assert_eq!(acq.read_timeout, Duration::from_secs(1));
        assert_eq!(acq.settle_delay, Duration::from_secs(1));
        assert_eq!(acq.command, UbxCommand::rate_10hz());
    }

    #[test]
    fn overrides() {
        let cfg = parse(&[
            "--serial-port",
            "/dev/ttyUSB0",
            "--baud-rate",
            "115200",
            "--timeout",
            "250",
            "--save-dir",
            "/tmp/fixes",
            "--compress",
        ]);
        assert_eq!(cfg.serial_port, "/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, 115200);
        assert_eq!(cfg.acquisition().read_timeout, Duration::from_millis(250));
        assert_eq!(cfg.save_dir, Some(PathBuf::from("/tmp/fixes")));
        assert!(cfg.compress);
    }

    #[test]
    fn zero_timeout_is_raised() {
        let cfg = parse(&["--timeout", "0"]);
        assert_eq!(cfg.acquisition().read_timeout, Duration::from_millis(10));
        let cfg = parse(&["--timeout", "5"]);
        assert_eq!(cfg.acquisition().read_timeout, Duration::from_millis(10));
    }

    #[test]
    fn store_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let cfg = parse(&["--frame-id", "rover", "--save-config"]);
        cfg.store(&path).unwrap();
        let loaded = PublisherCfg::load(&path).unwrap();
        assert_eq!(loaded.frame_id, "rover");
        // switches are not persisted
        assert!(!loaded.save_config);
        assert!(PublisherCfg::load(&dir.path().join("missing.json")).is_err());
    }
}
