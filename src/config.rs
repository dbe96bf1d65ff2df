//! JSON configuration loading (spec §6, §4.9).
//!
//! Keys: `pin` (integer), `activehigh` (boolean), `freq` (even integer,
//! `10..=120000`), optional `iodev`. A missing required key is fatal with
//! the "data error" exit category.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::types::HardwareConfig;

/// On-disk JSON shape. Field names match the wire keys from spec §6
/// exactly; [`HardwareConfig`] uses the more readable internal names.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    pin: u32,
    activehigh: bool,
    freq: u32,
    iodev: Option<u32>,
}

/// Read and validate a `HardwareConfig` from a JSON file at `path`.
pub fn load(path: &Path) -> Result<HardwareConfig, Error> {
    let text = fs::read_to_string(path).map_err(|e| {
        let err = Error::Config(format!("cannot read {}: {e}", path.display()));
        log::error!("{err}");
        err
    })?;
    let parsed: ConfigFile = serde_json::from_str(&text).map_err(|e| {
        let err = Error::Config(format!("malformed config {}: {e}", path.display()));
        log::error!("{err}");
        err
    })?;
    let cfg = HardwareConfig {
        pin_id: parsed.pin,
        active_high: parsed.activehigh,
        sample_rate_hz: parsed.freq,
        iodev: parsed.iodev,
    };
    if let Err(e) = cfg.validate() {
        log::error!("{e}");
        return Err(e);
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "nplpi-config-test-{}-{}.json",
            std::process::id(),
            contents.len()
        ));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_valid_config() {
        let path = write_temp(r#"{"pin": 17, "activehigh": true, "freq": 1000}"#);
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.pin_id, 17);
        assert!(cfg.active_high);
        assert_eq!(cfg.sample_rate_hz, 1000);
        assert_eq!(cfg.iodev, None);
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_odd_frequency() {
        let path = write_temp(r#"{"pin": 17, "activehigh": true, "freq": 1001}"#);
        assert!(load(&path).is_err());
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_missing_key() {
        let path = write_temp(r#"{"pin": 17, "freq": 1000}"#);
        assert!(load(&path).is_err());
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_out_of_range_frequency() {
        let path = write_temp(r#"{"pin": 17, "activehigh": true, "freq": 200000}"#);
        assert!(load(&path).is_err());
        fs::remove_file(path).ok();
    }
}
