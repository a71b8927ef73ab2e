//! Partition of every ion's levels into kinetics blocks.
//!
//! Consecutive levels of one energy-file group that share a configuration
//! signature form one block. The first own-level group of the first ion
//! opens a singleton block for each of its first `single_blocks` levels.
//! Levels of the ionized stage are matched onto the blocks already built for
//! the previous ion; those of the first ion form the parent blocks.

use super::model::{
    Block, IonizedLevel, KineticsState, Level, ParentStage, RecombinedSeries, SeriesLink,
    SeriesStep,
};
use super::signature::{ConfigSignature, parse_recombined_tag};
use crate::database::{DatabasePrefix, EnergyBlock, EnergyFile, LevelRecord, read_energy_file};
use crate::domain::{CrmError, CrmResult, StageId};
use std::path::Path;

type LevelSlots = Vec<Option<Level>>;

impl KineticsState {
    /// Reads every ion's level file and builds the block arena.
    ///
    /// `parent_abundance` pins the ionized stage below the first ion; `None`
    /// disables ionization, recombination, autoionization and the Rydberg
    /// extrapolation. `parent_prefix` names the parent's own database, whose
    /// levels are matched onto the parent blocks.
    pub fn build_blocks(
        &mut self,
        parent_abundance: Option<f64>,
        parent_prefix: Option<DatabasePrefix>,
    ) -> CrmResult<()> {
        self.validate_stage_sequence()?;
        self.atom = 0;
        self.symbol.clear();
        self.blocks.clear();
        self.matrix = None;
        for ion in &mut self.ions {
            ion.levels.clear();
            ion.rates.clear();
            ion.series.clear();
        }
        self.parent = ParentStage {
            nele: self.ions[0].nele - 1,
            abundance: parent_abundance,
            prefix: parent_prefix,
            ionized_map: Vec::new(),
        };

        let parent_file = match &self.parent.prefix {
            Some(prefix) => Some(read_energy_file(&prefix.energy_file())?),
            None => None,
        };

        let mut previous: Option<EnergyFile> = None;
        for index in 0..self.ions.len() {
            let path = self.ions[index].prefix.energy_file();
            let file = read_energy_file(&path)?;
            if index == 0 {
                if file.atom == 0 {
                    return Err(CrmError::input_validation(
                        "INPUT.ATOM",
                        format!("level file '{}' has no atomic number", path.display()),
                    ));
                }
                self.atom = file.atom;
                self.symbol = file.symbol.clone();
            }
            self.validate_file_stages(index, &file, &path)?;

            let mut slots: LevelSlots = vec![None; file.level_count()];
            match previous.as_ref() {
                Some(host) => self.map_ionized_levels(index, &file, host, &mut slots, &path)?,
                None => self.build_parent_blocks(&file, parent_file.as_ref(), &mut slots, &path)?,
            }
            self.build_own_blocks(index, &file, &mut slots, &path)?;
            self.ions[index].levels = collect_levels(slots, &path)?;

            if self.parent.is_coupled() {
                self.extrapolate_energies(index)?;
            }

            let ion = &self.ions[index];
            tracing::debug!(
                ion = index,
                nele = ion.nele,
                levels = ion.levels.len(),
                series = ion.series.len(),
                blocks = self.blocks.len(),
                "blocks built"
            );
            previous = Some(file);
        }

        Ok(())
    }

    fn validate_stage_sequence(&self) -> CrmResult<()> {
        let Some(first) = self.ions.first() else {
            return Err(CrmError::input_validation(
                "INPUT.NO_IONS",
                "at least one ion must be configured before building blocks",
            ));
        };
        if first.nele == 0 {
            return Err(CrmError::input_validation(
                "INPUT.NELE_SEQUENCE",
                "the first ion must carry at least one electron",
            ));
        }
        for pair in self.ions.windows(2) {
            if pair[1].nele != pair[0].nele + 1 {
                return Err(CrmError::input_validation(
                    "INPUT.NELE_SEQUENCE",
                    format!(
                        "NELE of the added ions is not a contiguous ascending sequence: {} follows {}",
                        pair[1].nele, pair[0].nele
                    ),
                ));
            }
        }
        Ok(())
    }

    fn validate_file_stages(&self, index: usize, file: &EnergyFile, path: &Path) -> CrmResult<()> {
        let nele = self.ions[index].nele;
        match file
            .blocks
            .iter()
            .find(|block| block.nele != nele && block.nele + 1 != nele)
        {
            Some(block) => Err(CrmError::input_validation(
                "INPUT.CHARGE_STATE",
                format!(
                    "level file '{}' holds a block with nele={} for ion with nele={}",
                    path.display(),
                    block.nele,
                    nele
                ),
            )),
            None => Ok(()),
        }
    }

    fn build_parent_blocks(
        &mut self,
        file: &EnergyFile,
        parent_file: Option<&EnergyFile>,
        slots: &mut LevelSlots,
        path: &Path,
    ) -> CrmResult<()> {
        let parent_nele = self.parent.nele;
        for group in file.blocks_with_nele(parent_nele) {
            self.push_signature_runs(StageId::Parent, group, 0, slots, path)?;

            let (Some(parent_file), Some(prefix)) = (parent_file, self.parent.prefix.as_ref())
            else {
                continue;
            };
            let pairs = match_levels(
                &group.levels,
                parent_file,
                parent_nele,
                &prefix.energy_file(),
            )?;
            self.parent
                .ionized_map
                .extend(pairs.into_iter().map(|(host, parent)| IonizedLevel {
                    parent_level: parent.ilev,
                    host_level: host.ilev,
                    energy: parent.energy,
                }));
        }
        Ok(())
    }

    fn map_ionized_levels(
        &self,
        index: usize,
        file: &EnergyFile,
        host_file: &EnergyFile,
        slots: &mut LevelSlots,
        path: &Path,
    ) -> CrmResult<()> {
        let host = &self.ions[index - 1];
        let host_path = host.prefix.energy_file();
        for group in file.blocks_with_nele(host.nele) {
            for (own, matched) in match_levels(&group.levels, host_file, host.nele, &host_path)? {
                let host_level = host.level(matched.ilev)?;
                let level = Level {
                    energy: own.energy,
                    j: own.j,
                    block: host_level.block,
                    slot: host_level.slot,
                };
                place_level(slots, own.ilev, level, path)?;
            }
        }
        Ok(())
    }

    fn build_own_blocks(
        &mut self,
        index: usize,
        file: &EnergyFile,
        slots: &mut LevelSlots,
        path: &Path,
    ) -> CrmResult<()> {
        let nele = self.ions[index].nele;
        for (group_index, group) in file.blocks_with_nele(nele).enumerate() {
            let singles = if index == 0 && group_index == 0 {
                self.config.single_blocks
            } else {
                0
            };
            self.push_signature_runs(StageId::Ion(index), group, singles, slots, path)?;
            self.register_series_step(index, group, slots, path)?;
        }
        Ok(())
    }

    /// Levels `0..=singles` of the group each open a new block; afterwards
    /// a block closes whenever the signature changes.
    fn push_signature_runs(
        &mut self,
        stage: StageId,
        group: &EnergyBlock,
        singles: usize,
        slots: &mut LevelSlots,
        path: &Path,
    ) -> CrmResult<()> {
        let mut current: Option<usize> = None;
        for (position, record) in group.levels.iter().enumerate() {
            let signature = ConfigSignature::parse(&record.ncomplex)?;
            let block_index = match current {
                Some(block) if position > singles && self.blocks[block].signature == signature => {
                    block
                }
                _ => {
                    let block = self.blocks.len();
                    self.blocks.push(Block::new(block, stage, signature, 0));
                    block
                }
            };
            current = Some(block_index);
            let slot = self.blocks[block_index].push_level();
            let level = Level {
                energy: record.energy,
                j: record.j,
                block: block_index,
                slot,
            };
            place_level(slots, record.ilev, level, path)?;
        }
        Ok(())
    }

    fn register_series_step(
        &mut self,
        index: usize,
        group: &EnergyBlock,
        slots: &LevelSlots,
        path: &Path,
    ) -> CrmResult<()> {
        let (Some(first), Some(last)) = (group.levels.first(), group.levels.last()) else {
            return Ok(());
        };
        let (Some(head), Some(tail)) = (
            parse_recombined_tag(&first.name),
            parse_recombined_tag(&last.name),
        ) else {
            return Ok(());
        };

        let contiguous = last.ilev >= first.ilev
            && last.ilev - first.ilev + 1 == group.levels.len()
            && group
                .levels
                .iter()
                .enumerate()
                .all(|(offset, record)| record.ilev == first.ilev + offset);
        if !contiguous {
            return Err(CrmError::input_validation(
                "INPUT.SERIES_RANGE",
                format!(
                    "recombined levels {}..{} in '{}' are not contiguous",
                    first.ilev,
                    last.ilev,
                    path.display()
                ),
            ));
        }

        let block = slots
            .get(first.ilev)
            .and_then(Option::as_ref)
            .map(|level| level.block)
            .ok_or_else(|| {
                CrmError::internal(
                    "SYS.SERIES_LEVEL",
                    format!("recombined level {} was not placed", first.ilev),
                )
            })?;
        let single_block = group.levels.iter().all(|record| {
            slots
                .get(record.ilev)
                .and_then(Option::as_ref)
                .is_some_and(|level| level.block == block)
        });
        if !single_block {
            return Err(CrmError::input_validation(
                "INPUT.SERIES_BLOCK",
                format!(
                    "recombined levels {}..{} in '{}' span several configuration blocks",
                    first.ilev,
                    last.ilev,
                    path.display()
                ),
            ));
        }

        let step = SeriesStep {
            n: head.n,
            imin: first.ilev,
            imax: last.ilev,
            block,
            extrapolated: false,
        };
        let ion = &mut self.ions[index];
        let series_index = match ion
            .series
            .iter()
            .position(|series| series.bmin == head.core && series.bmax == tail.core)
        {
            Some(position) => {
                let series = &mut ion.series[position];
                let width = series.steps[0].width();
                if width != step.width() || series.step(step.n).is_some() {
                    return Err(CrmError::input_validation(
                        "INPUT.SERIES_RANGE",
                        format!(
                            "recombined step n={} on core {}..{} in '{}' conflicts with earlier steps",
                            step.n,
                            head.core,
                            tail.core,
                            path.display()
                        ),
                    ));
                }
                series.insert_step(step);
                position
            }
            None => {
                ion.series
                    .push(RecombinedSeries::new(head.core, tail.core, step));
                ion.series.len() - 1
            }
        };
        self.blocks[block].series = Some(SeriesLink {
            series: series_index,
            n: step.n,
        });
        Ok(())
    }
}

fn place_level(slots: &mut LevelSlots, ilev: usize, level: Level, path: &Path) -> CrmResult<()> {
    let count = slots.len();
    let slot = slots.get_mut(ilev).ok_or_else(|| {
        CrmError::input_validation(
            "INPUT.LEVEL_INDEX",
            format!(
                "level index {} in '{}' exceeds the level count {}",
                ilev,
                path.display(),
                count
            ),
        )
    })?;
    if slot.is_some() {
        return Err(CrmError::input_validation(
            "INPUT.LEVEL_INDEX",
            format!("level index {} appears twice in '{}'", ilev, path.display()),
        ));
    }
    *slot = Some(level);
    Ok(())
}

fn collect_levels(slots: LevelSlots, path: &Path) -> CrmResult<Vec<Level>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(ilev, slot)| {
            slot.ok_or_else(|| {
                CrmError::input_validation(
                    "INPUT.LEVEL_INDEX",
                    format!(
                        "level {} of '{}' belongs to no block; its ionized stage has no match",
                        ilev,
                        path.display()
                    ),
                )
            })
        })
        .collect()
}

fn level_order(lhs: &LevelRecord, rhs: &LevelRecord) -> std::cmp::Ordering {
    lhs.j
        .cmp(&rhs.j)
        .then(lhs.p.cmp(&rhs.p))
        .then(lhs.energy.total_cmp(&rhs.energy))
}

/// Pairs ionized-stage `records` with the levels of the same signature in
/// `host`, both sides sorted by (j, parity, energy).
fn match_levels<'a>(
    records: &'a [LevelRecord],
    host: &'a EnergyFile,
    nele: u32,
    host_path: &Path,
) -> CrmResult<Vec<(&'a LevelRecord, &'a LevelRecord)>> {
    let mut groups: Vec<(ConfigSignature, Vec<&LevelRecord>)> = Vec::new();
    for record in records {
        let signature = ConfigSignature::parse(&record.ncomplex)?;
        match groups.iter_mut().find(|(existing, _)| *existing == signature) {
            Some((_, members)) => members.push(record),
            None => groups.push((signature, vec![record])),
        }
    }

    let mut pairs = Vec::with_capacity(records.len());
    for (signature, mut own) in groups {
        let mut matched = Vec::new();
        for candidate in host.blocks_with_nele(nele).flat_map(|block| &block.levels) {
            if ConfigSignature::parse(&candidate.ncomplex)? == signature {
                matched.push(candidate);
            }
        }
        if matched.len() != own.len() {
            return Err(CrmError::input_validation(
                "INPUT.LEVEL_MATCH",
                format!(
                    "ionized block '{}' has {} levels but '{}' holds {} levels of that configuration",
                    signature,
                    own.len(),
                    host_path.display(),
                    matched.len()
                ),
            ));
        }
        own.sort_by(|lhs, rhs| level_order(lhs, rhs));
        matched.sort_by(|lhs, rhs| level_order(lhs, rhs));
        pairs.extend(own.into_iter().zip(matched));
    }
    Ok(pairs)
}
