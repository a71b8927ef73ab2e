//! Run-wide kinetics parameters.
//!
//! Values are set once before block construction and only read afterwards.
//! Setters keep the tolerant semantics of the classic configuration calls:
//! out-of-range arguments leave the current value untouched.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ELECTRON_DENSITY: f64 = 1.0e-3;
pub const DEFAULT_ITER_ACCURACY: f64 = 1.0e-3;
pub const DEFAULT_ITER_STABILIZER: f64 = 0.75;
pub const DEFAULT_MAX_ITER: usize = 256;
pub const DEFAULT_CASCADE_ACCURACY: f64 = 1.0e-4;
pub const DEFAULT_SINGLE_BLOCKS: usize = 64;
pub const DEFAULT_TOPUP_NMAX: u32 = 400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KineticsConfig {
    /// Electron density in units of 1e10 cm^-3.
    pub electron_density: f64,
    /// Photon energy density in erg/(eV cm^3).
    pub photon_density: f64,
    pub iter_accuracy: f64,
    pub iter_stabilizer: f64,
    pub max_iter: usize,
    pub cascade: bool,
    pub cascade_accuracy: f64,
    /// Number of leading levels of an ion that each get a singleton block.
    pub single_blocks: usize,
    /// Extend every recombined series past its last tabulated step up to
    /// this principal quantum number.
    pub max_extrapolated_n: Option<u32>,
    /// Upper n of the hydrogenic sums folded into the highest series step.
    pub topup_nmax: u32,
}

impl Default for KineticsConfig {
    fn default() -> Self {
        Self {
            electron_density: DEFAULT_ELECTRON_DENSITY,
            photon_density: 0.0,
            iter_accuracy: DEFAULT_ITER_ACCURACY,
            iter_stabilizer: DEFAULT_ITER_STABILIZER,
            max_iter: DEFAULT_MAX_ITER,
            cascade: true,
            cascade_accuracy: DEFAULT_CASCADE_ACCURACY,
            single_blocks: DEFAULT_SINGLE_BLOCKS,
            max_extrapolated_n: None,
            topup_nmax: DEFAULT_TOPUP_NMAX,
        }
    }
}

impl KineticsConfig {
    pub fn set_electron_density(&mut self, density: f64) {
        if density >= 0.0 {
            self.electron_density = density;
        }
    }

    pub fn set_photon_density(&mut self, density: f64) {
        if density >= 0.0 {
            self.photon_density = density;
        }
    }

    /// Negative `max_iter` keeps the current cap.
    pub fn set_iteration(&mut self, accuracy: f64, stabilizer: f64, max_iter: i64) {
        if let Ok(max_iter) = usize::try_from(max_iter) {
            self.max_iter = max_iter;
        }
        if accuracy > 0.0 {
            self.iter_accuracy = accuracy;
        }
        if stabilizer > 0.0 && stabilizer < 1.0 {
            self.iter_stabilizer = stabilizer;
        }
    }

    pub fn set_cascade(&mut self, enabled: bool, accuracy: f64) {
        self.cascade = enabled;
        if accuracy > 0.0 {
            self.cascade_accuracy = accuracy;
        }
    }

    pub fn set_single_blocks(&mut self, count: usize) {
        self.single_blocks = count;
    }

    /// Returns the offending field name when a deserialized config is out of
    /// range.
    pub fn invalid_field(&self) -> Option<&'static str> {
        let checks = [
            ("electronDensity", self.electron_density >= 0.0),
            ("photonDensity", self.photon_density >= 0.0),
            ("iterAccuracy", self.iter_accuracy > 0.0),
            (
                "iterStabilizer",
                self.iter_stabilizer > 0.0 && self.iter_stabilizer < 1.0,
            ),
            ("cascadeAccuracy", self.cascade_accuracy > 0.0),
        ];
        checks
            .into_iter()
            .find(|(_, valid)| !valid)
            .map(|(field, _)| field)
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_ITER_STABILIZER, DEFAULT_MAX_ITER, KineticsConfig};

    #[test]
    fn setters_ignore_out_of_range_arguments() {
        let mut config = KineticsConfig::default();
        config.set_electron_density(-1.0);
        config.set_photon_density(-2.0);
        config.set_iteration(-1.0, 1.5, -3);
        config.set_cascade(false, 0.0);

        assert_eq!(config.electron_density, 1.0e-3);
        assert_eq!(config.photon_density, 0.0);
        assert_eq!(config.max_iter, DEFAULT_MAX_ITER);
        assert_eq!(config.iter_stabilizer, DEFAULT_ITER_STABILIZER);
        assert!(!config.cascade);
        assert_eq!(config.cascade_accuracy, 1.0e-4);

        config.set_iteration(1.0e-5, 0.5, 10);
        assert_eq!(config.max_iter, 10);
        assert_eq!(config.iter_accuracy, 1.0e-5);
        assert_eq!(config.iter_stabilizer, 0.5);
    }

    #[test]
    fn json_fields_default_when_missing() {
        let config: KineticsConfig =
            serde_json::from_str(r#"{ "electronDensity": 10.0, "maxExtrapolatedN": 12 }"#)
                .expect("config should parse");
        assert_eq!(config.electron_density, 10.0);
        assert_eq!(config.max_extrapolated_n, Some(12));
        assert_eq!(config.single_blocks, 64);
        assert!(config.cascade);
        assert_eq!(config.invalid_field(), None);
    }

    #[test]
    fn invalid_field_reports_stabilizer_outside_unit_interval() {
        let config = KineticsConfig {
            iter_stabilizer: 1.0,
            ..KineticsConfig::default()
        };
        assert_eq!(config.invalid_field(), Some("iterStabilizer"));
    }
}
