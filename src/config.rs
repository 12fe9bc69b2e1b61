/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Persisted settings
//!
//! Read from `config.toml` in the platform configuration directory. Every
//! field is optional, command line flags take precedence over the file.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default name hint, matched against instrument addresses
    pub instrument_name: Option<String>,
    pub output_filename: Option<String>,
    pub output_directory: Option<PathBuf>,
    pub trace_mode: bool,
    pub auto_view: bool,
    /// Per operation transport timeout
    pub timeout_ms: u64,
    pub usb: UsbConfig,
    pub serial: SerialConfig,
    pub lan: LanConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub enabled: bool,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanConfig {
    /// `host` or `host:port` entries
    pub hosts: Vec<String>,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            instrument_name: None,
            output_filename: None,
            output_directory: None,
            trace_mode: false,
            auto_view: false,
            timeout_ms: 5000,
            usb: UsbConfig::default(),
            serial: SerialConfig::default(),
            lan: LanConfig::default(),
        }
    }
}

impl Default for UsbConfig {
    fn default() -> Self {
        UsbConfig { enabled: true }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            enabled: false,
            baud_rate: 115_200,
        }
    }
}

impl Default for LanConfig {
    fn default() -> Self {
        LanConfig {
            hosts: Vec::new(),
            port: 5555,
        }
    }
}

impl Config {
    /// `<config dir>/grabscope/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("grabscope").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Config, Error> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config =
            toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise the default file if it exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Config, Error> {
        if let Some(path) = path {
            return Config::load(path);
        }
        match Config::default_path() {
            Some(path) if path.exists() => Config::load(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name hint with an empty string treated as no hint
    pub fn name_hint(&self) -> Option<&str> {
        self.instrument_name.as_deref().filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert!(config.usb.enabled);
        assert!(!config.serial.enabled);
    }

    #[test]
    fn partial_file() {
        let config: Config = toml::from_str(
            r#"
            instrument_name = "DHO"
            timeout_ms = 10000

            [lan]
            hosts = ["192.168.1.5", "scope.lan:5025"]
            "#,
        )
        .unwrap();

        assert_eq!(config.name_hint(), Some("DHO"));
        assert_eq!(config.timeout_ms, 10000);
        assert_eq!(config.lan.hosts.len(), 2);
        assert_eq!(config.lan.port, 5555);
        assert_eq!(config.serial.baud_rate, 115_200);
    }

    #[test]
    fn empty_name_is_no_hint() {
        let config = Config {
            instrument_name: Some(String::new()),
            ..Config::default()
        };
        assert_eq!(config.name_hint(), None);
    }

    #[test]
    fn save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            instrument_name: Some("127.0.0.5".into()),
            output_directory: Some(PathBuf::from("/tmp/captures")),
            auto_view: true,
            ..Config::default()
        };
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = Config::load_or_default(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "timeout_ms = \"soon\"").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
