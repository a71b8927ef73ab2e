//! Run description in, steady-state populations out.

use crate::common::config::KineticsConfig;
use crate::database::DatabasePrefix;
use crate::domain::{CrmError, CrmResult, StageId};
use crate::kinetics::{AbundancePin, ConvergenceReport, KineticsState, KineticsSummary};
use crate::numerics::EquilibratedLu;
use crate::physics::{ElectronDistribution, MaxwellianKernels};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentInput {
    /// `None` decouples the ionized stage.
    #[serde(default)]
    pub abundance: Option<f64>,
    /// The parent's own database, for its level matching and line rates.
    #[serde(default)]
    pub prefix: Option<DatabasePrefix>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IonInput {
    pub nele: u32,
    #[serde(default)]
    pub abundance: Option<f64>,
    pub prefix: DatabasePrefix,
}

/// One kinetics run. The atomic number comes from the first ion's level
/// file; relative database prefixes resolve against the input file's
/// directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    #[serde(default)]
    pub parent: ParentInput,
    pub ions: Vec<IonInput>,
    #[serde(default)]
    pub distribution: ElectronDistribution,
    #[serde(default)]
    pub config: KineticsConfig,
}

impl RunInput {
    pub fn from_path(path: &Path) -> CrmResult<Self> {
        let source = fs::read_to_string(path).map_err(|source| {
            CrmError::io_system(
                "IO.RUN_INPUT",
                format!("failed to read run input '{}': {}", path.display(), source),
            )
        })?;
        let input: Self = serde_json::from_str(&source).map_err(|error| {
            CrmError::input_validation(
                "INPUT.RUN_INPUT",
                format!("failed to parse run input '{}': {}", path.display(), error),
            )
        })?;
        input.validate()?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(input.resolved_against(base))
    }

    pub fn validate(&self) -> CrmResult<()> {
        if let Some(field) = self.config.invalid_field() {
            return Err(CrmError::input_validation(
                "INPUT.CONFIG",
                format!("configuration field '{field}' is out of range"),
            ));
        }
        if self.ions.is_empty() {
            return Err(CrmError::input_validation(
                "INPUT.NO_IONS",
                "run input lists no ions",
            ));
        }
        self.distribution.validate()
    }

    pub fn resolved_against(mut self, base: &Path) -> Self {
        for ion in &mut self.ions {
            ion.prefix = ion.prefix.resolved_against(base);
        }
        if let Some(prefix) = self.parent.prefix.as_mut() {
            *prefix = prefix.resolved_against(base);
        }
        self
    }

    /// Registers the ions and builds the block arena.
    pub fn build_state(&self) -> CrmResult<KineticsState> {
        let mut state = KineticsState::new(self.config.clone());
        for ion in &self.ions {
            state.add_ion(ion.nele, ion.abundance, ion.prefix.clone());
        }
        state.build_blocks(self.parent.abundance, self.parent.prefix.clone())?;
        Ok(state)
    }

    /// Builds, loads and solves the whole run with the Maxwellian kernels.
    pub fn execute(&self) -> CrmResult<(KineticsState, PopulationReport)> {
        self.execute_pinned(&[])
    }

    /// Like [`RunInput::execute`], with stage abundances overridden after
    /// the blocks are built.
    pub fn execute_pinned(
        &self,
        pins: &[AbundancePin],
    ) -> CrmResult<(KineticsState, PopulationReport)> {
        let kernels = MaxwellianKernels::from_distribution(self.distribution.clone())?;
        let mut state = self.build_state()?;
        state.pin_abundances(pins)?;
        let summary = state.solve_steady_state(&kernels, &EquilibratedLu)?;
        let report = PopulationReport::from_state(&state, Some(summary));
        Ok((state, report))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelReport {
    pub index: usize,
    pub energy: f64,
    pub j: i32,
    pub population: f64,
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockReport {
    pub index: usize,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_n: Option<u32>,
    pub total: f64,
    pub levels: Vec<LevelReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: StageId,
    pub nele: u32,
    pub abundance: Option<f64>,
    /// Sum of the stage's block totals.
    pub population: f64,
    pub blocks: Vec<BlockReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationReport {
    pub atom: u32,
    pub symbol: String,
    pub electron_density: f64,
    pub photon_density: f64,
    pub stages: Vec<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub populate: Option<ConvergenceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade: Option<ConvergenceReport>,
}

impl PopulationReport {
    pub fn from_state(state: &KineticsState, summary: Option<KineticsSummary>) -> Self {
        let mut stages = vec![StageId::Parent];
        stages.extend((0..state.ions.len()).map(StageId::Ion));
        let stages = stages
            .into_iter()
            .filter_map(|stage| stage_report(state, stage))
            .collect();

        Self {
            atom: state.atom,
            symbol: state.symbol.clone(),
            electron_density: state.config.electron_density,
            photon_density: state.config.photon_density,
            stages,
            populate: summary.map(|summary| summary.populate),
            cascade: summary.and_then(|summary| summary.cascade),
        }
    }

    pub fn stage(&self, stage: StageId) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    pub fn write_json(&self, path: &Path) -> CrmResult<()> {
        crate::database::write_document(path, self)
    }

    /// One line per block: owner, index, level count, signature, series n.
    pub fn render_layout(&self) -> String {
        let mut rendered = String::new();
        for stage in &self.stages {
            let _ = writeln!(
                rendered,
                "{:<8} nele={:<3} blocks={:<5} abundance={}",
                stage.stage.to_string(),
                stage.nele,
                stage.blocks.len(),
                stage
                    .abundance
                    .map_or_else(|| "free".to_string(), |value| format!("{value:.4e}"))
            );
            for block in &stage.blocks {
                let _ = writeln!(
                    rendered,
                    "  block {:>5} levels={:<4} [{}]{}",
                    block.index,
                    block.levels.len(),
                    block.signature,
                    block
                        .series_n
                        .map(|n| format!(" n={n}"))
                        .unwrap_or_default()
                );
            }
        }
        rendered
    }
}

fn stage_report(state: &KineticsState, stage: StageId) -> Option<StageReport> {
    let (nele, abundance) = match stage {
        StageId::Parent => (state.parent.nele, state.parent.abundance),
        StageId::Ion(index) => {
            let ion = state.ions.get(index)?;
            (ion.nele, ion.abundance)
        }
    };
    let host = state.ions.get(stage.host_ion())?;

    let mut blocks: Vec<BlockReport> = state
        .blocks
        .iter()
        .filter(|block| block.stage == stage)
        .map(|block| BlockReport {
            index: block.index,
            signature: block.signature.to_string(),
            series_n: block.series.map(|link| link.n),
            total: block.nb,
            levels: Vec::new(),
        })
        .collect();
    if blocks.is_empty() {
        return None;
    }
    for (index, level) in host.levels.iter().enumerate() {
        let block = &state.blocks[level.block];
        if block.stage != stage {
            continue;
        }
        let Some(report) = blocks.iter_mut().find(|report| report.index == level.block) else {
            continue;
        };
        report.levels.push(LevelReport {
            index,
            energy: level.energy,
            j: level.j,
            population: block.n[level.slot],
            fraction: block.r[level.slot],
        });
    }

    Some(StageReport {
        stage,
        nele,
        abundance,
        population: blocks.iter().map(|block| block.total).sum(),
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::RunInput;
    use crate::domain::CrmErrorCategory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn run_input_defaults_and_resolves_prefixes() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("run.json");
        fs::write(
            &path,
            r#"{
                "parent": { "abundance": 0.0 },
                "ions": [ { "nele": 2, "abundance": 1.0, "prefix": "db/c5" } ],
                "config": { "electronDensity": 5.0 }
            }"#,
        )
        .expect("fixture should be written");

        let input = RunInput::from_path(&path).expect("input should parse");
        assert_eq!(input.config.electron_density, 5.0);
        assert_eq!(input.distribution.maxwellian_temperature(), Some(1.0));
        assert_eq!(input.parent.prefix, None);
        assert_eq!(
            input.ions[0].prefix.energy_file(),
            temp.path().join("db/c5.en")
        );
        assert!(input.ions[0].prefix.as_path().is_absolute());
    }

    #[test]
    fn run_input_rejects_out_of_range_config() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("run.json");
        fs::write(
            &path,
            r#"{ "ions": [ { "nele": 2, "prefix": "c5" } ], "config": { "iterStabilizer": 1.5 } }"#,
        )
        .expect("fixture should be written");
        let error = RunInput::from_path(&path).expect_err("stabilizer out of range");
        assert_eq!(error.placeholder(), "INPUT.CONFIG");
        assert!(error.message().contains("iterStabilizer"));
    }

    #[test]
    fn missing_run_input_is_an_io_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = RunInput::from_path(&temp.path().join("absent.json")).expect_err("missing");
        assert_eq!(error.category(), CrmErrorCategory::IoSystemError);
        assert_eq!(error.placeholder(), "IO.RUN_INPUT");
    }
}
