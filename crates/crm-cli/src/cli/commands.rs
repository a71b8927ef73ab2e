use super::CliError;
use super::helpers::{ensure_parent_dir, render_summary};
use crm_core::domain::CrmError;
use crm_core::kinetics::AbundancePin;
use crm_core::physics::ElectronDistribution;
use crm_core::report::{PopulationReport, RunInput};
use std::path::{Path, PathBuf};

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Run input JSON
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Population report output path
    #[arg(long, short, default_value = "populations.json")]
    output: PathBuf,

    /// Electron density override in 1e10 cm^-3
    #[arg(long)]
    electron_density: Option<f64>,

    /// Maxwellian temperature override in eV
    #[arg(long)]
    temperature: Option<f64>,

    /// Skip the cascade loop
    #[arg(long)]
    no_cascade: bool,

    /// Stage abundance override as NELE=VALUE, or NELE=free; repeatable
    #[arg(long = "abundance", value_name = "NELE=VALUE", value_parser = parse_abundance_pin)]
    abundances: Vec<AbundancePin>,
}

#[derive(clap::Args)]
pub(super) struct InspectArgs {
    /// Run input JSON
    #[arg(value_name = "INPUT")]
    input: PathBuf,
}

impl RunArgs {
    fn apply_overrides(&self, input: &mut RunInput) -> Result<(), CliError> {
        if let Some(density) = self.electron_density {
            if density < 0.0 {
                return Err(CliError::Usage(format!(
                    "Invalid electron density '{density}'; expected a non-negative value."
                )));
            }
            input.config.set_electron_density(density);
        }
        if let Some(temperature) = self.temperature {
            let distribution = ElectronDistribution::maxwellian(temperature);
            distribution.validate().map_err(CliError::Compute)?;
            input.distribution = distribution;
        }
        if self.no_cascade {
            input.config.cascade = false;
        }
        Ok(())
    }
}

fn parse_abundance_pin(raw: &str) -> Result<AbundancePin, String> {
    let (nele, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NELE=VALUE, got '{raw}'"))?;
    let nele = nele
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid electron count '{nele}'"))?;
    let abundance = match value.trim() {
        "free" => None,
        value => match value.parse::<f64>() {
            Ok(abundance) if abundance.is_finite() && abundance >= 0.0 => Some(abundance),
            _ => {
                return Err(format!(
                    "invalid abundance '{value}'; expected a non-negative value or 'free'"
                ));
            }
        },
    };
    Ok(AbundancePin { nele, abundance })
}

fn load_input(path: &Path) -> Result<RunInput, CliError> {
    let input = RunInput::from_path(path).map_err(CliError::Compute)?;
    tracing::debug!(
        input = %path.display(),
        ions = input.ions.len(),
        "run input loaded"
    );
    Ok(input)
}

pub(super) fn run_run_command(args: RunArgs) -> Result<i32, CliError> {
    let mut input = load_input(&args.input)?;
    args.apply_overrides(&mut input)?;

    let (_, report) = input
        .execute_pinned(&args.abundances)
        .map_err(CliError::Compute)?;
    ensure_parent_dir(&args.output)?;
    report.write_json(&args.output).map_err(CliError::Compute)?;

    print!("{}", render_summary(&report));
    println!("JSON report: {}", args.output.display());
    Ok(0)
}

pub(super) fn run_inspect_command(args: InspectArgs) -> Result<i32, CliError> {
    let input = load_input(&args.input)?;
    let state = input.build_state().map_err(CliError::Compute)?;
    if state.blocks.is_empty() {
        return Err(CliError::Compute(CrmError::input_validation(
            "INPUT.NO_BLOCKS",
            format!("run input '{}' produced no blocks", args.input.display()),
        )));
    }
    let report = PopulationReport::from_state(&state, None);
    println!(
        "{} (Z={}): {} ions, {} blocks",
        report.symbol,
        report.atom,
        state.ions.len(),
        state.blocks.len()
    );
    print!("{}", report.render_layout());
    Ok(0)
}
