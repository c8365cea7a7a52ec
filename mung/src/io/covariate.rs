use crate::keyed::KeyedVector;
use anyhow::{bail, Context, Result};
use log::info;
use matrix_util::common_io::read_lines_of_words_delim;
use matrix_util::dmatrix_io::parse_cell;

/// Load one sample-keyed covariate (e.g., relative growth rate)
///
/// * `file` - `sample value...` table with a header, tab or comma
///   separated
/// * `column` - value column by header name; the first one if `None`
pub fn read_covariate(file: &str, column: Option<&str>) -> Result<KeyedVector> {
    info!("Loading covariate from {}", file);
    let parsed = read_lines_of_words_delim(file, &['\t', ','], 0)?;

    if parsed.header.len() < 2 {
        bail!("{} has no covariate column (need sample + values)", file);
    }

    let j = match column {
        Some(name) => parsed
            .header
            .iter()
            .skip(1)
            .position(|h| h.as_ref() == name)
            .map(|j| j + 1)
            .with_context(|| format!("no column {} in {}", name, file))?,
        None => 1,
    };

    let mut keys = Vec::with_capacity(parsed.lines.len());
    let mut values = Vec::with_capacity(parsed.lines.len());
    for (i, row) in parsed.lines.iter().enumerate() {
        if row.len() <= j {
            bail!("{}: line {} has {} columns", file, i + 2, row.len());
        }
        keys.push(row[0].clone());
        values.push(parse_cell(&row[j]).with_context(|| format!("{}: line {}", file, i + 2))?);
    }

    let covariate = KeyedVector::new(keys, values)?;
    info!("  {}: {} samples", parsed.header[j], covariate.len());
    Ok(covariate)
}
