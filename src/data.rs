use serde::{Deserialize, Serialize};

/// Contiguous Column Major Matrix data container.
///
/// This structure borrows a dense matrix of values held in a single contiguous memory block,
/// in column-major order (Fortran-style), which allows for efficient column slicing. Trees
/// scan whole columns when searching for splits, so this is the layout every fit uses.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `f64`).
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
    stride1: usize,
    stride2: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix {
            data,
            rows,
            cols,
            stride1: rows,
            stride2: 1,
        }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.item_index(i, j)]
    }

    fn item_index(&self, i: usize, j: usize) -> usize {
        let mut idx = self.stride2 * i;
        idx += j * self.stride1;
        idx
    }

    /// Get a slice of a column in the matrix.
    ///
    /// * `col` - The index of the column to select.
    /// * `start_row` - The index of the start of the slice.
    /// * `end_row` - The index of the end of the slice of the column to select.
    pub fn get_col_slice(&self, col: usize, start_row: usize, end_row: usize) -> &[T] {
        let i = self.item_index(start_row, col);
        let j = self.item_index(end_row, col);
        &self.data[i..j]
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        self.get_col_slice(col, 0, self.rows)
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Copy a subset of the columns, in the order given, into a new
    /// column major buffer with `self.rows` rows.
    pub fn select_columns(&self, cols: &[usize]) -> Vec<T> {
        let mut out = Vec::with_capacity(self.rows * cols.len());
        for &c in cols {
            out.extend_from_slice(self.get_col(c));
        }
        out
    }
}

/// An owned column major design matrix, as produced by the preprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignMatrix {
    /// The raw data in column-major order.
    pub data: Vec<f64>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl DesignMatrix {
    /// Create a new design matrix from column major data.
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        DesignMatrix { data, rows, cols }
    }

    /// Build a design matrix from a set of equally long columns.
    pub fn from_columns(columns: Vec<Vec<f64>>, rows: usize) -> Self {
        let cols = columns.len();
        let data: Vec<f64> = columns.into_iter().flatten().collect();
        DesignMatrix::new(data, rows, cols)
    }

    /// Borrow the design matrix as a [`Matrix`] view.
    pub fn view(&self) -> Matrix<'_, f64> {
        Matrix::new(&self.data, self.rows, self.cols)
    }

    /// Keep only the given columns, in the order given.
    pub fn select_columns(&self, cols: &[usize]) -> DesignMatrix {
        DesignMatrix::new(self.view().select_columns(cols), self.rows, cols.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_get() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 2, 3);
        assert_eq!(m.get(0, 0), &1);
        assert_eq!(m.get(1, 0), &2);
    }

    #[test]
    fn test_matrix_get_col_slice() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 3, 2);
        assert_eq!(m.get_col_slice(0, 0, 3), &vec![1, 2, 3]);
        assert_eq!(m.get_col_slice(1, 0, 2), &vec![5, 6]);
        assert_eq!(m.get_col_slice(1, 1, 3), &vec![6, 7]);
    }

    #[test]
    fn test_matrix_select() {
        let v = vec![1, 2, 3, 5, 6, 7, 8, 9, 10];
        let m = Matrix::new(&v, 3, 3);
        assert_eq!(m.select_columns(&[2, 0]), vec![8, 9, 10, 1, 2, 3]);
    }

    #[test]
    fn test_design_matrix_select() {
        let dm = DesignMatrix::from_columns(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]], 2);
        assert_eq!(dm.cols, 3);
        let sub = dm.select_columns(&[1]);
        assert_eq!(sub.data, vec![3.0, 4.0]);
        assert_eq!(sub.cols, 1);
    }
}
