//! Block-level population kinetics.
//!
//! A run goes through [`KineticsState::build_blocks`], rate loading,
//! [`KineticsState::init_blocks`], the populate loop and, in cascade mode,
//! the cascade loop. Every step mutates one [`KineticsState`].

mod blocks;
mod cascade;
mod driver;
mod flux;
mod matrix;
pub mod model;
mod rates;
mod relaxation;
pub mod signature;

pub use driver::{ConvergenceReport, KineticsSummary};
pub use matrix::BlockMatrix;
pub use model::{
    AbundancePin, Block, BlockRateBucket, Ion, IonizedLevel, KineticsState, Level, MergePolicy,
    ParentStage, Rate, RateBuckets, RateTables, RecombinedSeries, SeriesLink, SeriesStep,
};
pub use relaxation::RelaxationPass;
pub use signature::{ConfigSignature, RecombinedTag, ShellOccupation, parse_recombined_tag};
