use super::{ElectronDistribution, RateKernels, RatePair, TransitionInput};
use crate::common::constants::{
    ALPHFS, ERG_TO_EV, EV_TO_KELVIN, HARTREE_EV, HBARC_EV_CM, ME_C2_EV, PI, RATE_AU, RATE_UNIT,
    RYDBERG_EV, SPEED_OF_LIGHT_CM, THERMAL_LAMBDA3_1EV,
};
use crate::domain::{CrmError, CrmResult};
use crate::numerics::exp_e1_scaled;

/// Collision-strength prefactor of the Maxwellian excitation rate, cm^3 s^-1 K^1/2.
const EXCITATION_PREFACTOR: f64 = 8.629e-6;
/// Lotz prefactor for `a` in units of 1e-14 cm^2 eV^2.
const LOTZ_PREFACTOR: f64 = 6.7e-7;
/// Threshold photoionization cross sections are tabulated in Mb.
const MEGABARN_CM2: f64 = 1.0e-18;
/// Kramers threshold photoionization cross section of hydrogen n=1, cm^2.
const KRAMERS_SIGMA0: f64 = 7.907e-18;

fn milne_prefactor() -> f64 {
    SPEED_OF_LIGHT_CM * (2.0 / PI).sqrt() / ME_C2_EV.powf(1.5)
}

fn photon_absorption_prefactor() -> f64 {
    PI * PI * HBARC_EV_CM.powi(3) * ERG_TO_EV
}

fn thermal_lambda3(temperature: f64) -> f64 {
    THERMAL_LAMBDA3_1EV / temperature.powf(1.5)
}

/// Rate kernels averaged over a Maxwellian electron distribution and a
/// spectrally flat photon field.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxwellianKernels {
    distribution: ElectronDistribution,
    temperature: f64,
}

impl MaxwellianKernels {
    pub fn new(temperature_ev: f64) -> CrmResult<Self> {
        Self::from_distribution(ElectronDistribution::maxwellian(temperature_ev))
    }

    pub fn from_distribution(distribution: ElectronDistribution) -> CrmResult<Self> {
        let temperature = distribution.maxwellian_temperature().ok_or_else(|| {
            CrmError::input_validation(
                "INPUT.DISTRIBUTION",
                format!(
                    "built-in rate kernels need a Maxwellian distribution (kind 0), got kind {} with {:?}",
                    distribution.kind, distribution.params
                ),
            )
        })?;
        Ok(Self {
            distribution,
            temperature,
        })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    fn reduced_energy(&self, energy: f64) -> (f64, f64) {
        let energy_ev = energy.max(0.0) * HARTREE_EV;
        (energy_ev, energy_ev / self.temperature)
    }
}

impl RateKernels for MaxwellianKernels {
    fn distribution(&self) -> &ElectronDistribution {
        &self.distribution
    }

    /// `params[0]` is the effective collision strength.
    fn excitation(&self, input: &TransitionInput<'_>) -> RatePair {
        let (_, x) = self.reduced_energy(input.energy);
        let upsilon = input.param(0);
        let base = EXCITATION_PREFACTOR * upsilon / (self.temperature * EV_TO_KELVIN).sqrt();
        RatePair::new(
            base * (-x).exp() / input.weight_initial(),
            base / input.weight_final(),
        )
    }

    /// `params[0]` is the weighted oscillator strength gf of the line; the
    /// origin is the upper level.
    fn radiative(&self, input: &TransitionInput<'_>) -> RatePair {
        let energy = input.energy.abs();
        if energy <= 0.0 {
            return RatePair::default();
        }
        let gf = input.param(0);
        let upper = input.weight_initial();
        let lower = input.weight_final();
        let einstein_a = 2.0 * ALPHFS.powi(3) * energy * energy * gf / upper * RATE_AU / RATE_UNIT;
        let energy_ev = energy * HARTREE_EV;
        let absorption =
            einstein_a * upper / lower * photon_absorption_prefactor() / energy_ev.powi(3);
        RatePair::new(einstein_a, absorption)
    }

    /// `params[0]` is the Lotz coefficient; the origin is the bound level.
    fn ionization(&self, input: &TransitionInput<'_>) -> RatePair {
        let (_, x) = self.reduced_energy(input.energy);
        if x <= 0.0 {
            return RatePair::default();
        }
        let scaled = LOTZ_PREFACTOR * input.param(0) / self.temperature.powf(1.5)
            * exp_e1_scaled(x)
            / x;
        let three_body = scaled * RATE_UNIT * input.weight_initial()
            / (2.0 * input.weight_final())
            * thermal_lambda3(self.temperature);
        RatePair::new(scaled * (-x).exp(), three_body)
    }

    /// `params[0]` is the threshold photoionization cross section in Mb; the
    /// origin is the free level.
    fn recombination(&self, input: &TransitionInput<'_>) -> RatePair {
        let (energy_ev, x) = self.reduced_energy(input.energy);
        if x <= 0.0 {
            return RatePair::default();
        }
        let sigma = input.param(0) * MEGABARN_CM2;
        let bound = input.weight_final();
        let free = input.weight_initial();
        let capture = bound / free * sigma * milne_prefactor() * energy_ev.powi(3)
            / self.temperature.powf(1.5)
            * exp_e1_scaled(x);
        let photoionization = SPEED_OF_LIGHT_CM * sigma * ERG_TO_EV / (3.0 * energy_ev) / RATE_UNIT;
        RatePair::new(capture, photoionization)
    }

    fn autoionization(&self, input: &TransitionInput<'_>) -> RatePair {
        let (_, x) = self.reduced_energy(input.energy);
        let rate = input.param(0) * RATE_AU;
        let capture = rate * input.weight_initial() / (2.0 * input.weight_final())
            * thermal_lambda3(self.temperature)
            * (-x).exp();
        RatePair::new(rate / RATE_UNIT, capture)
    }
}

/// Kramers radiative recombination coefficient (cm^3 s^-1) into shell `n` of
/// a hydrogenic ion of charge `z` at temperature `temperature` (eV).
pub fn kramers_recombination(temperature: f64, z: f64, n: u32) -> f64 {
    if temperature <= 0.0 || n == 0 {
        return 0.0;
    }
    let n = f64::from(n);
    let binding = RYDBERG_EV * z * z / (n * n);
    let x = binding / temperature;
    let sigma = KRAMERS_SIGMA0 * n / (z * z);
    2.0 * n * n * sigma * milne_prefactor() * binding.powi(3) / temperature.powf(1.5)
        * exp_e1_scaled(x)
}

#[cfg(test)]
mod tests {
    use super::{MaxwellianKernels, kramers_recombination};
    use crate::common::constants::{HARTREE_EV, RATE_AU, RATE_UNIT};
    use crate::physics::{ElectronDistribution, RateKernels, TransitionInput};

    fn input(params: &[f64], j_initial: i32, j_final: i32, energy_ev: f64) -> TransitionInput<'_> {
        TransitionInput {
            j_initial,
            j_final,
            energy: energy_ev / HARTREE_EV,
            params,
            initial: 0,
            final_level: 1,
        }
    }

    #[test]
    fn excitation_obeys_detailed_balance() {
        let kernels = MaxwellianKernels::new(20.0).expect("kernels");
        let params = [0.5];
        let rates = kernels.excitation(&input(&params, 1, 3, 10.0));
        let expected = (4.0 / 2.0) * (-10.0_f64 / 20.0).exp();
        assert!((rates.forward / rates.reverse - expected).abs() < 1.0e-12);
    }

    #[test]
    fn radiative_rate_scales_with_energy_squared() {
        let kernels = MaxwellianKernels::new(20.0).expect("kernels");
        let params = [0.2];
        let low = kernels.radiative(&input(&params, 3, 1, 10.0));
        let high = kernels.radiative(&input(&params, 3, 1, 20.0));
        assert!((high.forward / low.forward - 4.0).abs() < 1.0e-10);
        assert!(low.reverse > 0.0);
    }

    #[test]
    fn autoionization_forward_rate_is_converted_from_atomic_units() {
        let kernels = MaxwellianKernels::new(20.0).expect("kernels");
        let params = [1.0e-3];
        let rates = kernels.autoionization(&input(&params, 1, 0, 5.0));
        assert!((rates.forward - 1.0e-3 * RATE_AU / RATE_UNIT).abs() < 1.0e-6);
        assert!(rates.reverse > 0.0);
    }

    #[test]
    fn recombination_and_ionization_vanish_at_zero_energy() {
        let kernels = MaxwellianKernels::new(20.0).expect("kernels");
        let params = [1.0];
        assert_eq!(kernels.recombination(&input(&params, 0, 1, 0.0)).forward, 0.0);
        assert_eq!(kernels.ionization(&input(&params, 1, 0, 0.0)).forward, 0.0);
    }

    #[test]
    fn kramers_rate_falls_off_with_principal_quantum_number() {
        let low = kramers_recombination(100.0, 10.0, 10);
        let high = kramers_recombination(100.0, 10.0, 11);
        assert!(low > high && high > 0.0);
        assert_eq!(kramers_recombination(0.0, 10.0, 10), 0.0);
    }

    #[test]
    fn hydrogenic_topup_sums_higher_shells() {
        let kernels = MaxwellianKernels::new(100.0).expect("kernels");
        let (rate, topup) = kernels
            .hydrogenic_recombination(10.0, 10, 12)
            .expect("Maxwellian");
        let expected = kramers_recombination(100.0, 10.0, 11) + kramers_recombination(100.0, 10.0, 12);
        assert_eq!(rate, kramers_recombination(100.0, 10.0, 10));
        assert!((topup - expected).abs() <= 1.0e-12 * expected);
    }

    #[test]
    fn non_maxwellian_distribution_is_rejected() {
        let error = MaxwellianKernels::from_distribution(ElectronDistribution {
            kind: 2,
            params: vec![1.0],
        })
        .expect_err("kind 2 unsupported");
        assert_eq!(error.placeholder(), "INPUT.DISTRIBUTION");
    }
}
