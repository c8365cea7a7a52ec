use crate::activity::TargetWeights;
use anyhow::{bail, Context, Result};
use log::info;
use matrix_util::common_io::{delimiter_for, read_lines_of_words_delim};
use matrix_util::dmatrix_io::{parse_cell, NamedMatrix};

/// Read regulator -> target weights
///
/// * `file` - long `regulator target weight` table with a header, or
///   a targets × regulators matrix if `wide`
pub fn read_target_weights(file: &str, wide: bool) -> Result<TargetWeights> {
    let triplets = if wide {
        read_wide(file)?
    } else {
        read_long(file)?
    };

    let n_triplets = triplets.len();
    let weights = TargetWeights::from_triplets(triplets)
        .with_context(|| format!("no usable weight in {}", file))?;

    info!(
        "{} regulators, {} targets from {} weights in {}",
        weights.num_regulators(),
        weights.all_targets().len(),
        n_triplets,
        file
    );
    Ok(weights)
}

fn read_long(file: &str) -> Result<Vec<(Box<str>, Box<str>, f64)>> {
    let data = read_lines_of_words_delim(file, delimiter_for(file), 0)?;

    let mut triplets = Vec::with_capacity(data.lines.len());
    for (i, words) in data.lines.into_iter().enumerate() {
        if words.len() < 3 {
            bail!(
                "{}: line {} has {} columns, expected regulator, target, weight",
                file,
                i + 2,
                words.len()
            );
        }
        let w = parse_cell(&words[2]).with_context(|| format!("{}: line {}", file, i + 2))?;
        let mut words = words.into_iter();
        if let (Some(r), Some(t)) = (words.next(), words.next()) {
            triplets.push((r, t, w));
        }
    }
    Ok(triplets)
}

fn read_wide(file: &str) -> Result<Vec<(Box<str>, Box<str>, f64)>> {
    let table = NamedMatrix::from_file(file)?;
    let mut triplets = vec![];
    for (j, reg) in table.cols.iter().enumerate() {
        for (i, tgt) in table.rows.iter().enumerate() {
            let w = table.mat[(i, j)];
            if w.is_finite() && w != 0.0 {
                triplets.push((reg.clone(), tgt.clone(), w));
            }
        }
    }
    Ok(triplets)
}
