//! Physical constants shared by the rate kernels and the cascade extrapolator.
//!
//! Rates follow one unit convention throughout the crate: densities are
//! counted in units of 1e10 cm^-3, so a collisional coefficient in cm^3/s times
//! an electron density gives a rate in units of 1e10 s^-1. Spontaneous rates
//! are stored in the same 1e10 s^-1 unit.

pub const PI: f64 = std::f64::consts::PI;
pub const HARTREE_EV: f64 = 27.211_386_245_988_f64;
pub const RYDBERG_EV: f64 = HARTREE_EV / 2.0;
pub const ALPHINV: f64 = 137.035_999_084_f64;
pub const ALPHFS: f64 = 1.0 / ALPHINV;
pub const ME_C2_EV: f64 = 510_998.950_f64;
pub const SPEED_OF_LIGHT_CM: f64 = 2.997_924_58e10_f64;
pub const HBARC_EV_CM: f64 = 1.973_269_804e-5_f64;
pub const HC_EV_CM: f64 = 2.0 * PI * HBARC_EV_CM;
pub const ERG_TO_EV: f64 = 6.241_509_074e11_f64;
pub const EV_TO_KELVIN: f64 = 11_604.518_f64;

/// Atomic unit of rate (1/time) in s^-1.
pub const RATE_AU: f64 = 4.134_137_333_5e16_f64;
/// Scale between physical rates (s^-1) and stored rates (1e10 s^-1).
pub const RATE_UNIT: f64 = 1.0e10_f64;

/// Cube of the electron thermal de Broglie wavelength at kT = 1 eV, in cm^3.
pub const THERMAL_LAMBDA3_1EV: f64 = 3.313_0e-22_f64;

/// Two rates or populations closer than this are treated as equal to zero
/// when they sit next to a unit-sized quantity.
pub const NEGLIGIBLE: f64 = f64::EPSILON;
/// Transition energies below this (Hartree) are considered non-positive.
pub const ENERGY_EPSILON: f64 = 1.0e-16_f64;

pub fn is_negligible(value: f64) -> bool {
    value.abs() <= NEGLIGIBLE
}
