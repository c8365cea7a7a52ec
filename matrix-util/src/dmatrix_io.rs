use crate::common_io::{read_lines_of_words_delim, write_lines, Delimiter};
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};

/// A real-valued matrix with row and column names
pub type NamedMatrix = MatWithNames<DMatrix<f64>>;

/// Number of decimals written for each cell
pub const DEFAULT_PRECISION: usize = 6;

/// Token written for a missing (non-finite) cell
pub const MISSING_TOKEN: &str = "NA";

/// Parse one cell; `NA`, `NaN`, `nan`, `None` and empty cells are missing
pub fn parse_cell(word: &str) -> anyhow::Result<f64> {
    let word = word.trim();
    match word {
        "" | "NA" | "na" | "NaN" | "nan" | "NAN" | "None" | "null" => Ok(f64::NAN),
        _ => word
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("failed to parse '{}': {}", word, e)),
    }
}

/// Format one cell with fixed precision, `NA` for missing values
pub fn format_cell(x: f64, precision: usize) -> String {
    if x.is_finite() {
        format!("{:.*}", precision, x)
    } else {
        MISSING_TOKEN.to_string()
    }
}

impl IoOps for DMatrix<f64> {
    type Scalar = f64;
    type Mat = Self;

    fn read_names_delim(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let parsed = read_lines_of_words_delim(file, delim, 0)?;

        // the first header cell usually labels the row-name column,
        // but R-style tables leave it out
        let no_corner = parsed
            .lines
            .first()
            .is_some_and(|words| words.len() == parsed.header.len() + 1);

        let cols: Vec<Box<str>> = if no_corner {
            parsed.header.clone()
        } else {
            parsed.header.iter().skip(1).cloned().collect()
        };

        if cols.is_empty() {
            return Err(anyhow::anyhow!("{}: no data columns in the header", file));
        }

        let ncols = cols.len();
        let nrows = parsed.lines.len();

        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);

        for (i, words) in parsed.lines.iter().enumerate() {
            if words.len() != ncols + 1 {
                return Err(anyhow::anyhow!(
                    "{}: line {} has {} fields, expected {}",
                    file,
                    i + 2,
                    words.len(),
                    ncols + 1
                ));
            }
            rows.push(words[0].clone());
            for w in &words[1..] {
                data.push(parse_cell(w)?);
            }
        }

        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<f64>::from_row_iterator(nrows, ncols, data),
        })
    }

    fn write_names_delim(
        &self,
        file: &str,
        delim: &str,
        rows: &[Box<str>],
        cols: &[Box<str>],
        corner: &str,
    ) -> anyhow::Result<()> {
        if rows.len() != self.nrows() || cols.len() != self.ncols() {
            return Err(anyhow::anyhow!(
                "names ({} x {}) don't match the matrix ({} x {})",
                rows.len(),
                cols.len(),
                self.nrows(),
                self.ncols()
            ));
        }

        let mut lines: Vec<Box<str>> = Vec::with_capacity(self.nrows() + 1);

        let header = std::iter::once(corner)
            .chain(cols.iter().map(|x| x.as_ref()))
            .collect::<Vec<_>>()
            .join(delim);
        lines.push(header.into_boxed_str());

        for (i, row) in self.row_iter().enumerate() {
            let line = std::iter::once(rows[i].to_string())
                .chain(row.iter().map(|&x| format_cell(x, DEFAULT_PRECISION)))
                .collect::<Vec<_>>()
                .join(delim);
            lines.push(line.into_boxed_str());
        }

        write_lines(&lines, file)
    }
}

impl MatWithNames<DMatrix<f64>> {
    pub fn new(
        rows: Vec<Box<str>>,
        cols: Vec<Box<str>>,
        mat: DMatrix<f64>,
    ) -> anyhow::Result<Self> {
        if rows.len() != mat.nrows() || cols.len() != mat.ncols() {
            return Err(anyhow::anyhow!(
                "names ({} x {}) don't match the matrix ({} x {})",
                rows.len(),
                cols.len(),
                mat.nrows(),
                mat.ncols()
            ));
        }
        Ok(Self { rows, cols, mat })
    }

    pub fn transpose(&self) -> Self {
        Self {
            rows: self.cols.clone(),
            cols: self.rows.clone(),
            mat: self.mat.transpose(),
        }
    }

    /// Keep the rows at `indices` in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            cols: self.cols.clone(),
            mat: self.mat.select_rows(indices),
        }
    }

    /// Rename rows, e.g., to normalize numeric identifiers
    pub fn map_row_names(mut self, f: impl Fn(&str) -> Box<str>) -> Self {
        self.rows = self.rows.iter().map(|r| f(r)).collect();
        self
    }

    pub fn to_file(&self, file: &str, corner: &str) -> anyhow::Result<()> {
        let delim = crate::common_io::delimiter_for(file);
        self.mat
            .write_names_delim(file, delim, &self.rows, &self.cols, corner)
    }

    pub fn from_file(file: &str) -> anyhow::Result<Self> {
        DMatrix::<f64>::read_names(file)
    }
}
