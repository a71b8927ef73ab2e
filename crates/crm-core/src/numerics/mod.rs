pub mod linalg;
pub mod special;

pub use linalg::{DenseSolver, EquilibratedLu, LuDecomposition, LuError, lu_factorize, lu_solve};
pub use special::{exp_e1_scaled, hydrogenic_sum_cubed};

use faer::Mat;

pub type DenseMatrix = Mat<f64>;
