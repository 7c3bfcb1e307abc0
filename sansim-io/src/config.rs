//! JSON configuration files.
//!
//! Every field is optional; missing fields take the instrument defaults.

use std::fs;
use std::path::Path;

use log::debug;
use serde::de::DeserializeOwned;

use sansim_algorithms::Scenario;
use sansim_core::config::{AveragingParams, InstrumentConfig};

use crate::Result;

/// Reads any JSON document from a file.
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let text = fs::read_to_string(path.as_ref())?;
    debug!("loaded {}", path.as_ref().display());
    Ok(serde_json::from_str(&text)?)
}

/// Parses and validates an instrument configuration.
pub fn parse_config(json: &str) -> Result<InstrumentConfig> {
    let config: InstrumentConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Loads and validates an instrument configuration.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<InstrumentConfig> {
    let config: InstrumentConfig = read_json(path)?;
    config.validate()?;
    Ok(config)
}

/// Loads and validates averaging parameters.
pub fn load_averaging<P: AsRef<Path>>(path: P) -> Result<AveragingParams> {
    let params: AveragingParams = read_json(path)?;
    params.validate()?;
    Ok(params)
}

/// Loads a list of scenarios, validating each.
pub fn load_scenarios<P: AsRef<Path>>(path: P) -> Result<Vec<Scenario>> {
    let scenarios: Vec<Scenario> = read_json(path)?;
    for s in &scenarios {
        s.config.validate()?;
        s.averaging.validate()?;
    }
    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::Error;
    use sansim_core::config::{AveragingKind, DetectorSection};
    use sansim_core::instrument::{GuideConfig, Instrument};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = parse_config(r#"{"wavelength": 8.0, "guides": "Lens"}"#).unwrap();
        assert_eq!(config.wavelength, 8.0);
        assert_eq!(config.guides, GuideConfig::Lens);
        assert_eq!(config.instrument, Instrument::Ng7);
        assert_eq!(config.x_pixels, 128);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = parse_config(r#"{"wavelength": 40.0}"#).unwrap_err();
        assert!(matches!(err, Error::CoreError(_)));
        assert!(matches!(parse_config("{"), Err(Error::Json(_))));
    }

    #[test]
    fn test_load_averaging_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"kind": "Sector", "phi_degrees": 45.0, "dphi_degrees": 5.0, "section": "Left"}}"#
        )
        .unwrap();
        let params = load_averaging(file.path()).unwrap();
        assert_eq!(params.kind, AveragingKind::Sector);
        assert_eq!(params.section, DetectorSection::Left);
        assert_eq!(params.dphi_degrees, 5.0);
    }

    #[test]
    fn test_load_scenarios_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"config": {{"detector_distance_cm": 400.0}}}}, {{"averaging": {{"kind": "Annular"}}}}]"#
        )
        .unwrap();
        let scenarios = load_scenarios(file.path()).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].config.detector_distance_cm, 400.0);
        assert_eq!(scenarios[1].averaging.kind, AveragingKind::Annular);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/sansim.json"),
            Err(Error::Io(_))
        ));
    }
}
