//! Cross-validated prediction of responses (metabolites) from
//! features (regulator activities).

pub mod align;
pub mod folds;
pub mod predict;

pub use align::*;
pub use folds::*;
pub use predict::*;
