pub mod common_io;
pub mod dmatrix_io;
pub mod dmatrix_stat;
pub mod traits;
