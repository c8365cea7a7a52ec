use crate::common_io::Delimiter;

/// A matrix carrying its row and column names
#[derive(Clone, Debug)]
pub struct MatWithNames<M> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: M,
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    /// Read a matrix with a header line of column names and a first
    /// column of row names
    fn read_names_delim(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    /// Pick the delimiter from the file extension
    fn read_names(file: &str) -> anyhow::Result<MatWithNames<Self::Mat>> {
        Self::read_names_delim(file, crate::common_io::delimiter_for(file))
    }

    fn write_names_delim(
        &self,
        file: &str,
        delim: &str,
        rows: &[Box<str>],
        cols: &[Box<str>],
        corner: &str,
    ) -> anyhow::Result<()>;
}

/// Statistics over columns ignoring non-finite (missing) entries
pub trait ColumnStatOps {
    /// Number of finite entries in each column
    fn count_finite_columns(&self) -> Vec<usize>;
}
