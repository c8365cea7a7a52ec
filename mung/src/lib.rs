pub mod activity;
pub mod cv;
pub mod error;
pub mod io;
pub mod keyed;
pub mod regression;
pub mod residualize;
pub mod scoring;
