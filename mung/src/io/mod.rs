pub mod covariate;
pub mod results;
pub mod weights;

/// Metabolite m/z values as identifiers: exactly 4 decimals
pub fn format_mz(mz: f64) -> Box<str> {
    format!("{:.4}", mz).into_boxed_str()
}

/// Numeric identifiers (m/z) are rewritten by `format_mz` so that
/// tables from different stages join on the same key; anything else
/// is kept as is
pub fn normalize_key(key: &str) -> Box<str> {
    match key.trim().parse::<f64>() {
        Ok(mz) if mz.is_finite() => format_mz(mz),
        _ => key.into(),
    }
}
