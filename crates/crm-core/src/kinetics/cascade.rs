//! Hydrogenic extension of recombined series.
//!
//! Energies are extrapolated while blocks are built; the rate passes run
//! right after the explicit rates of the same kind have been loaded, and
//! only touch series that gained synthetic steps.

use super::model::{Block, KineticsState, Level, MergePolicy, Rate, SeriesLink, SeriesStep};
use crate::common::constants::{ENERGY_EPSILON, RATE_AU, RATE_UNIT};
use crate::domain::{CrmResult, RateKind, StageId};
use crate::numerics::hydrogenic_sum_cubed;
use crate::physics::{RateKernels, TransitionInput};

impl KineticsState {
    /// Residual charge seen by an electron added onto the ionized stage.
    fn screened_charge(&self, ion: usize) -> f64 {
        f64::from(self.atom) - f64::from(self.ions[ion].nele) + 1.0
    }

    /// Appends one full copy of the last tabulated step for every missing
    /// n between the two highest tabulated steps, and for every n above the
    /// last tabulated step up to `max_extrapolated_n`.
    pub(crate) fn extrapolate_energies(&mut self, index: usize) -> CrmResult<()> {
        let z = self.screened_charge(index);
        let c = 0.5 * z * z;
        let max_n = self.config.max_extrapolated_n;

        for series_index in 0..self.ions[index].series.len() {
            let Some((last, previous)) = self.ions[index].series[series_index].last_explicit_pair()
            else {
                continue;
            };
            let mut targets: Vec<u32> = previous
                .map(|step| (step.n + 1)..last.n)
                .into_iter()
                .flatten()
                .collect();
            if let Some(max_n) = max_n {
                targets.extend((last.n + 1)..=max_n);
            }
            if targets.is_empty() {
                continue;
            }

            let n1 = f64::from(last.n);
            let a = -c / (n1 * n1);
            let signature = self.blocks[last.block].signature.clone();
            for n in targets {
                let block_index = self.blocks.len();
                let mut block = Block::new(
                    block_index,
                    StageId::Ion(index),
                    signature.with_outer_n(n),
                    0,
                );
                block.series = Some(SeriesLink {
                    series: series_index,
                    n,
                });

                let ion = &mut self.ions[index];
                let imin = ion.levels.len();
                let nf = f64::from(n);
                let d = -c / (nf * nf);
                for offset in 0..last.width() {
                    let source = &ion.levels[last.imin + offset];
                    let limit = source.energy - a;
                    let correction = match previous {
                        Some(prev) if n < last.n && prev.imin + offset <= prev.imax => {
                            let n0 = f64::from(prev.n);
                            let mut b = ion.levels[prev.imin + offset].energy - limit;
                            b = -c / b;
                            b /= n0 * n0;
                            1.0 + (b - 1.0) * (nf - n1) / (n0 - n1)
                        }
                        _ => 1.0,
                    };
                    let level = Level {
                        energy: limit + d / correction,
                        j: source.j,
                        block: block_index,
                        slot: block.push_level(),
                    };
                    ion.levels.push(level);
                }

                let step = SeriesStep {
                    n,
                    imin,
                    imax: ion.levels.len() - 1,
                    block: block_index,
                    extrapolated: true,
                };
                ion.series[series_index].insert_step(step);
                self.blocks.push(block);
            }

            let series = &self.ions[index].series[series_index];
            tracing::debug!(
                ion = index,
                core_min = series.bmin,
                core_max = series.bmax,
                n_ext = series.n_ext,
                steps = series.steps.len(),
                "recombined series extrapolated"
            );
        }
        Ok(())
    }

    /// Radiative rates out of the last tabulated step, scaled by `(n1/n)^3`.
    /// Rates into another series at the same n are moved along to that
    /// series' step at the new n with unchanged strength.
    pub(crate) fn extrapolate_radiative(&mut self, index: usize) -> CrmResult<()> {
        let ion = &self.ions[index];
        let mut synthesized = Vec::new();
        let mut dropped = 0_usize;

        for series in ion.series.iter().filter(|series| series.is_extrapolated()) {
            let Some((last, _)) = series.last_explicit_pair() else {
                continue;
            };
            let n1 = f64::from(last.n);
            for bucket in ion
                .rates
                .get(RateKind::Radiative)
                .iter()
                .filter(|bucket| bucket.origin == last.block)
            {
                let target = self.blocks[bucket.destination]
                    .series
                    .filter(|link| link.n == last.n)
                    .and_then(|link| {
                        let target = &ion.series[link.series];
                        target.step(last.n).map(|step| (target, step.imin))
                    });

                for rate in &bucket.rates {
                    for step in series.extrapolated_steps() {
                        let i = rate.i - last.imin + step.imin;
                        match target {
                            None => {
                                let scale = (n1 / f64::from(step.n)).powi(3);
                                synthesized.push(Rate::new(
                                    i,
                                    rate.f,
                                    scale * rate.dir,
                                    scale * rate.inv,
                                ));
                            }
                            Some((target_series, anchor)) => {
                                let offset = rate.f - anchor;
                                match target_series.step(step.n) {
                                    Some(moved) if moved.imin + offset <= moved.imax => {
                                        synthesized.push(Rate::new(
                                            i,
                                            moved.imin + offset,
                                            rate.dir,
                                            rate.inv,
                                        ));
                                    }
                                    _ => dropped += 1,
                                }
                            }
                        }
                    }
                }
            }
        }

        if dropped > 0 {
            tracing::warn!(
                ion = index,
                dropped,
                "extrapolated radiative rates without a destination level were dropped"
            );
        }
        let ion = &mut self.ions[index];
        for rate in synthesized {
            ion.add_rate(RateKind::Radiative, rate, MergePolicy::Append)?;
        }
        Ok(())
    }

    /// Recombination into the last tabulated step is normalized to the
    /// hydrogenic rate and copied to every synthetic step with the ratio of
    /// hydrogenic rates. The highest step also absorbs the summed rate into
    /// all shells above it.
    pub(crate) fn extrapolate_recombination(
        &mut self,
        index: usize,
        kernels: &dyn RateKernels,
    ) -> CrmResult<()> {
        let z = self.screened_charge(index);
        let topup_nmax = self.config.topup_nmax;
        if kernels.distribution().maxwellian_temperature().is_none() {
            if self.ions[index].series.iter().any(|series| series.is_extrapolated()) {
                tracing::warn!(
                    ion = index,
                    kind = kernels.distribution().kind,
                    "recombination extrapolation needs a Maxwellian distribution, skipping"
                );
            }
            return Ok(());
        }

        let mut synthesized = Vec::new();
        let ion = &mut self.ions[index];
        for series in ion.series.iter().filter(|series| series.is_extrapolated()) {
            let (Some((last, _)), Some(highest)) =
                (series.last_explicit_pair(), series.highest_step().copied())
            else {
                continue;
            };
            let Some((alpha_last, _)) = kernels.hydrogenic_recombination(z, last.n, topup_nmax)
            else {
                continue;
            };
            let Some((alpha_top, topup)) =
                kernels.hydrogenic_recombination(z, highest.n, topup_nmax)
            else {
                continue;
            };
            let topup_factor = if alpha_top > 0.0 {
                1.0 + topup / alpha_top
            } else {
                1.0
            };

            let buckets = ion.rates.get_mut(RateKind::Recombination);
            let explicit_total: f64 = buckets
                .iter()
                .filter(|bucket| bucket.destination == last.block)
                .flat_map(|bucket| &bucket.rates)
                .filter(|rate| rate.i == series.bmin)
                .map(|rate| rate.dir)
                .sum();
            if explicit_total <= 0.0 || alpha_last <= 0.0 {
                tracing::warn!(
                    ion = index,
                    core = series.bmin,
                    n = last.n,
                    "no recombination from the series core into its last step, skipping"
                );
                continue;
            }
            let normalization = alpha_last / explicit_total;

            let ratios = series
                .extrapolated_steps()
                .map(|step| {
                    let alpha = kernels
                        .hydrogenic_recombination(z, step.n, topup_nmax)
                        .map_or(0.0, |(alpha, _)| alpha);
                    let mut ratio = alpha / alpha_last;
                    if step.n == highest.n {
                        ratio *= topup_factor;
                    }
                    (*step, ratio)
                })
                .collect::<Vec<_>>();

            for bucket in buckets
                .iter_mut()
                .filter(|bucket| bucket.destination == last.block)
            {
                for rate in &mut bucket.rates {
                    rate.dir *= normalization;
                    for (step, ratio) in &ratios {
                        synthesized.push(Rate::new(
                            rate.i,
                            rate.f - last.imin + step.imin,
                            ratio * rate.dir,
                            0.0,
                        ));
                    }
                    if last.n == highest.n {
                        rate.dir *= topup_factor;
                    }
                }
            }
        }

        for rate in synthesized {
            ion.add_rate(RateKind::Recombination, rate, MergePolicy::Append)?;
        }
        Ok(())
    }

    /// Autoionization out of the last tabulated step scaled by `(n1/n)^3`;
    /// capture rates are rebuilt through the kernel from the new energies.
    pub(crate) fn extrapolate_autoionization(
        &mut self,
        index: usize,
        kernels: &dyn RateKernels,
    ) -> CrmResult<()> {
        let topup_nmax = self.config.topup_nmax;
        let ion = &mut self.ions[index];
        let mut synthesized = Vec::new();

        for series in ion.series.iter().filter(|series| series.is_extrapolated()) {
            let (Some((last, _)), Some(highest)) =
                (series.last_explicit_pair(), series.highest_step().copied())
            else {
                continue;
            };
            let n1 = f64::from(last.n);
            let top_n = f64::from(highest.n);
            let topup_factor =
                1.0 + hydrogenic_sum_cubed(highest.n + 1, topup_nmax) * top_n * top_n * top_n;

            let steps = series.extrapolated_steps().copied().collect::<Vec<_>>();
            let levels = &ion.levels;
            for bucket in ion
                .rates
                .get_mut(RateKind::Autoionization)
                .iter_mut()
                .filter(|bucket| bucket.origin == last.block)
            {
                for rate in &mut bucket.rates {
                    for step in &steps {
                        let i = rate.i - last.imin + step.imin;
                        let (Some(upper), Some(lower)) = (levels.get(i), levels.get(rate.f))
                        else {
                            continue;
                        };
                        let energy = upper.energy - lower.energy;
                        if energy < ENERGY_EPSILON {
                            continue;
                        }
                        let scale = (n1 / f64::from(step.n)).powi(3);
                        let params = [scale * rate.dir * RATE_UNIT / RATE_AU];
                        let pair = kernels.autoionization(&TransitionInput {
                            j_initial: upper.j,
                            j_final: lower.j,
                            energy,
                            params: &params,
                            initial: i,
                            final_level: rate.f,
                        });
                        let reverse = if step.n == highest.n {
                            pair.reverse * topup_factor
                        } else {
                            pair.reverse
                        };
                        synthesized.push(Rate::new(i, rate.f, pair.forward, reverse));
                    }
                    if last.n == highest.n {
                        rate.inv *= topup_factor;
                    }
                }
            }
        }

        for rate in synthesized {
            ion.add_rate(RateKind::Autoionization, rate, MergePolicy::Append)?;
        }
        Ok(())
    }
}
