use super::model::{Ion, Rate};
use crate::common::config::KineticsConfig;
use crate::domain::RateKind;

/// Density-weighted coefficients of one edge.
///
/// `forward` moves population from level `i` to level `f`, `reverse` from `f`
/// back to `i`. Block initialisation, matrix assembly and relaxation all read
/// rates through here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EdgeFlux {
    pub forward: f64,
    pub reverse: f64,
}

impl EdgeFlux {
    pub(crate) fn of(kind: RateKind, rate: &Rate, ion: &Ion, config: &KineticsConfig) -> Self {
        let ne = config.electron_density;
        let photons = config.photon_density;
        let inv = rate.inv.max(0.0);
        let (forward, reverse) = match kind {
            RateKind::Excitation => (ne * rate.dir, ne * inv),
            RateKind::Radiative => {
                let absorption = photons * inv;
                // Stimulated emission rides on the absorption coefficient.
                let stimulated =
                    absorption * ion.levels[rate.f].weight() / ion.levels[rate.i].weight();
                (rate.dir + stimulated, absorption)
            }
            RateKind::Recombination => (ne * rate.dir, photons * inv),
            RateKind::Autoionization => (rate.dir, ne * inv),
            // Three-body recombination.
            RateKind::Ionization => (ne * rate.dir, ne * ne * inv),
        };
        Self { forward, reverse }
    }

    /// Spontaneous channels mark a level as able to decay.
    pub(crate) fn is_spontaneous(kind: RateKind) -> bool {
        matches!(kind, RateKind::Radiative | RateKind::Autoionization)
    }
}

#[cfg(test)]
mod tests {
    use super::EdgeFlux;
    use crate::common::config::KineticsConfig;
    use crate::database::DatabasePrefix;
    use crate::domain::RateKind;
    use crate::kinetics::model::{Ion, Level, Rate};

    fn ion() -> Ion {
        let mut ion = Ion::new(2, Some(1.0), DatabasePrefix::new("ion"));
        for (slot, j) in [0, 2].into_iter().enumerate() {
            ion.levels.push(Level {
                energy: slot as f64,
                j,
                block: slot,
                slot: 0,
            });
        }
        ion
    }

    #[test]
    fn collisional_kinds_scale_with_electron_density() {
        let mut config = KineticsConfig::default();
        config.electron_density = 10.0;
        let rate = Rate::new(0, 1, 2.0, 3.0);
        let ion = ion();

        let excitation = EdgeFlux::of(RateKind::Excitation, &rate, &ion, &config);
        assert_eq!((excitation.forward, excitation.reverse), (20.0, 30.0));
        let ionization = EdgeFlux::of(RateKind::Ionization, &rate, &ion, &config);
        assert_eq!((ionization.forward, ionization.reverse), (20.0, 300.0));
        let capture = EdgeFlux::of(RateKind::Autoionization, &rate, &ion, &config);
        assert_eq!((capture.forward, capture.reverse), (2.0, 30.0));
    }

    #[test]
    fn radiative_photon_terms_carry_weight_ratio() {
        let mut config = KineticsConfig::default();
        config.photon_density = 0.5;
        let rate = Rate::new(1, 0, 4.0, 2.0);
        let flux = EdgeFlux::of(RateKind::Radiative, &rate, &ion(), &config);
        assert_eq!(flux.reverse, 1.0);
        assert!((flux.forward - (4.0 + 1.0 / 3.0)).abs() < 1.0e-12);

        config.photon_density = 0.0;
        let dark = EdgeFlux::of(RateKind::Radiative, &rate, &ion(), &config);
        assert_eq!((dark.forward, dark.reverse), (4.0, 0.0));
        assert!(EdgeFlux::is_spontaneous(RateKind::Radiative));
        assert!(!EdgeFlux::is_spontaneous(RateKind::Recombination));
    }
}
