//! Rate physics kernels.
//!
//! Loading turns every tabulated transition into a (forward, reverse) pair of
//! rate coefficients through a [`RateKernels`] implementation. The kinetics
//! engine never looks at raw parameters itself.

mod maxwellian;

pub use maxwellian::{MaxwellianKernels, kramers_recombination};

use crate::domain::{CrmError, CrmResult, RateKind};
use serde::{Deserialize, Serialize};

pub const MAXWELLIAN_KIND: u32 = 0;

/// Electron (and photon) energy distribution as seen by the kernels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectronDistribution {
    pub kind: u32,
    pub params: Vec<f64>,
}

impl ElectronDistribution {
    pub fn maxwellian(temperature_ev: f64) -> Self {
        Self {
            kind: MAXWELLIAN_KIND,
            params: vec![temperature_ev],
        }
    }

    /// Temperature in eV when the distribution is Maxwellian.
    pub fn maxwellian_temperature(&self) -> Option<f64> {
        if self.kind != MAXWELLIAN_KIND {
            return None;
        }
        self.params
            .first()
            .copied()
            .filter(|temperature| *temperature > 0.0)
    }

    pub fn validate(&self) -> CrmResult<()> {
        if self.kind == MAXWELLIAN_KIND && self.maxwellian_temperature().is_none() {
            return Err(CrmError::input_validation(
                "INPUT.DISTRIBUTION",
                format!(
                    "Maxwellian distribution needs a positive temperature, got {:?}",
                    self.params
                ),
            ));
        }
        Ok(())
    }
}

impl Default for ElectronDistribution {
    fn default() -> Self {
        Self::maxwellian(1.0)
    }
}

/// One tabulated transition handed to a kernel.
#[derive(Debug, Clone, Copy)]
pub struct TransitionInput<'a> {
    /// Doubled angular momentum of the origin level.
    pub j_initial: i32,
    /// Doubled angular momentum of the destination level.
    pub j_final: i32,
    /// Transition energy in Hartree.
    pub energy: f64,
    pub params: &'a [f64],
    pub initial: usize,
    pub final_level: usize,
}

impl TransitionInput<'_> {
    pub fn weight_initial(&self) -> f64 {
        f64::from(self.j_initial) + 1.0
    }

    pub fn weight_final(&self) -> f64 {
        f64::from(self.j_final) + 1.0
    }

    pub fn param(&self, index: usize) -> f64 {
        self.params.get(index).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RatePair {
    pub forward: f64,
    pub reverse: f64,
}

impl RatePair {
    pub const fn new(forward: f64, reverse: f64) -> Self {
        Self { forward, reverse }
    }
}

pub trait RateKernels {
    fn distribution(&self) -> &ElectronDistribution;

    fn excitation(&self, input: &TransitionInput<'_>) -> RatePair;
    fn radiative(&self, input: &TransitionInput<'_>) -> RatePair;
    fn ionization(&self, input: &TransitionInput<'_>) -> RatePair;
    fn recombination(&self, input: &TransitionInput<'_>) -> RatePair;
    /// `params[0]` holds the autoionization rate in atomic units.
    fn autoionization(&self, input: &TransitionInput<'_>) -> RatePair;

    fn evaluate(&self, kind: RateKind, input: &TransitionInput<'_>) -> RatePair {
        match kind {
            RateKind::Excitation => self.excitation(input),
            RateKind::Radiative => self.radiative(input),
            RateKind::Ionization => self.ionization(input),
            RateKind::Recombination => self.recombination(input),
            RateKind::Autoionization => self.autoionization(input),
        }
    }

    /// Hydrogenic recombination rate into shell `n` of an ion with residual
    /// charge `z`, and the summed rate of shells `n+1..=topup_nmax`.
    ///
    /// `None` when the distribution is not Maxwellian.
    fn hydrogenic_recombination(&self, z: f64, n: u32, topup_nmax: u32) -> Option<(f64, f64)> {
        let temperature = self.distribution().maxwellian_temperature()?;
        let rate = kramers_recombination(temperature, z, n);
        let topup = ((n + 1)..=topup_nmax)
            .map(|m| kramers_recombination(temperature, z, m))
            .sum();
        Some((rate, topup))
    }
}

#[cfg(test)]
mod tests {
    use super::{ElectronDistribution, RatePair, TransitionInput};

    #[test]
    fn only_kind_zero_with_positive_temperature_is_maxwellian() {
        assert_eq!(
            ElectronDistribution::maxwellian(50.0).maxwellian_temperature(),
            Some(50.0)
        );
        let other = ElectronDistribution {
            kind: 1,
            params: vec![50.0, 2.0],
        };
        assert_eq!(other.maxwellian_temperature(), None);
        assert!(other.validate().is_ok());

        let broken = ElectronDistribution {
            kind: 0,
            params: Vec::new(),
        };
        let error = broken.validate().expect_err("missing temperature");
        assert_eq!(error.placeholder(), "INPUT.DISTRIBUTION");
    }

    #[test]
    fn transition_input_exposes_statistical_weights() {
        let params = [3.0];
        let input = TransitionInput {
            j_initial: 3,
            j_final: 0,
            energy: 1.0,
            params: &params,
            initial: 4,
            final_level: 0,
        };
        assert_eq!(input.weight_initial(), 4.0);
        assert_eq!(input.weight_final(), 1.0);
        assert_eq!(input.param(0), 3.0);
        assert_eq!(input.param(5), 0.0);
        assert_eq!(RatePair::default(), RatePair::new(0.0, 0.0));
    }
}
