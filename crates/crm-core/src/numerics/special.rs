//! Special functions used by the Maxwellian rate kernels.

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const SERIES_EPSILON: f64 = 1.0e-16;
const MAX_TERMS: usize = 200;

/// `exp(x) * E1(x)` for `x > 0`.
///
/// Power series below 1, modified Lentz continued fraction above. Returns
/// `f64::INFINITY` for non-positive arguments, where E1 diverges.
pub fn exp_e1_scaled(x: f64) -> f64 {
    if x.is_nan() || x <= 0.0 {
        return f64::INFINITY;
    }

    if x <= 1.0 {
        let mut sum = 0.0;
        let mut term = 1.0;
        for k in 1..=MAX_TERMS {
            term *= -x / k as f64;
            let contribution = -term / k as f64;
            sum += contribution;
            if contribution.abs() < sum.abs() * SERIES_EPSILON {
                break;
            }
        }
        return (-EULER_GAMMA - x.ln() + sum) * x.exp();
    }

    let tiny = f64::MIN_POSITIVE / f64::EPSILON;
    let mut b = x + 1.0;
    let mut c = 1.0 / tiny;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_TERMS {
        let a = -((i * i) as f64);
        b += 2.0;
        d = 1.0 / (a * d + b);
        c = b + a / c;
        let delta = c * d;
        h *= delta;
        if (delta - 1.0).abs() < SERIES_EPSILON {
            break;
        }
    }
    h
}

/// `sum_{m = n_lo}^{n_hi} m^-3`, zero for an empty range.
pub fn hydrogenic_sum_cubed(n_lo: u32, n_hi: u32) -> f64 {
    (n_lo.max(1)..=n_hi)
        .map(|m| {
            let inverse = 1.0 / f64::from(m);
            inverse * inverse * inverse
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::{exp_e1_scaled, hydrogenic_sum_cubed};

    #[test]
    fn scaled_e1_matches_reference_values() {
        // E1(0.5) = 0.5597735947761608, E1(1) = 0.21938393439552029,
        // E1(5) = 0.001148295591275326
        let cases = [
            (0.5, 0.559_773_594_776_160_8),
            (1.0, 0.219_383_934_395_520_3),
            (5.0, 0.001_148_295_591_275_326),
        ];
        for (x, e1) in cases {
            let expected = e1 * f64::exp(x);
            let actual = exp_e1_scaled(x);
            assert!(
                ((actual - expected) / expected).abs() < 1.0e-10,
                "x={x}: {actual} vs {expected}"
            );
        }
    }

    #[test]
    fn scaled_e1_approaches_inverse_argument_for_large_x() {
        let x = 400.0;
        let value = exp_e1_scaled(x);
        assert!((value * x - 1.0).abs() < 1.0e-2);
        assert!(exp_e1_scaled(0.0).is_infinite());
    }

    #[test]
    fn cubic_sum_handles_empty_and_short_ranges() {
        assert_eq!(hydrogenic_sum_cubed(5, 4), 0.0);
        let sum = hydrogenic_sum_cubed(1, 2);
        assert!((sum - 1.125).abs() < 1.0e-15);
    }
}
