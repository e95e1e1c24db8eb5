//! MNA matrix storage and the dense LU solver.

use crate::error::{Result, SimError};

/// Pivots smaller than this are treated as zero.
const PIVOT_EPSILON: f64 = 1e-18;

/// MNA matrix system Ax = z.
///
/// Linear contributions are stamped once after analysis and cached in
/// `orig_a`/`orig_z`; every sub-iteration starts from a copy of that cache.
#[derive(Debug, Clone)]
pub struct MnaMatrix {
    /// System matrix A (row-major)
    pub a: Vec<f64>,
    /// Source vector z
    pub z: Vec<f64>,
    /// Solution vector x
    pub x: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// LU decomposition of A (for efficient solving)
    pub lu: Vec<f64>,
    /// Pivot indices for LU decomposition
    pub pivots: Vec<usize>,
    /// Cached linear part of A
    orig_a: Vec<f64>,
    /// Cached linear part of z
    orig_z: Vec<f64>,
}

impl MnaMatrix {
    /// Create a new, zeroed MNA system of the given dimension.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            z: vec![0.0; size],
            x: vec![0.0; size],
            size,
            lu: vec![0.0; size * size],
            pivots: (0..size).collect(),
            orig_a: vec![0.0; size * size],
            orig_z: vec![0.0; size],
        }
    }

    /// Clear the matrix and vectors to zero.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.z.fill(0.0);
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Add to source vector element.
    pub fn add_source(&mut self, row: usize, value: f64) {
        self.z[row] += value;
    }

    /// Remember the current contents as the linear part of the system.
    pub fn cache_linear(&mut self) {
        self.orig_a.copy_from_slice(&self.a);
        self.orig_z.copy_from_slice(&self.z);
    }

    /// Restore the cached linear part of the source vector only.
    pub fn restore_sources(&mut self) {
        self.z.copy_from_slice(&self.orig_z);
    }

    /// Restore the cached linear part of matrix and source vector.
    pub fn restore_linear(&mut self) {
        self.a.copy_from_slice(&self.orig_a);
        self.z.copy_from_slice(&self.orig_z);
    }

    /// Find the first non-finite matrix entry, as `(row, col, value)`.
    pub fn first_non_finite(&self) -> Option<(usize, usize, f64)> {
        self.a
            .iter()
            .position(|v| !v.is_finite())
            .map(|i| (i / self.size, i % self.size, self.a[i]))
    }

    /// Perform LU decomposition with partial pivoting.
    pub fn factor(&mut self) -> Result<()> {
        let n = self.size;

        // A row of zeros can never be pivoted away
        for row in self.a.chunks(n.max(1)).take(n) {
            if row.iter().all(|&v| v == 0.0) {
                return Err(SimError::SingularMatrix);
            }
        }

        self.lu.copy_from_slice(&self.a);
        for (i, p) in self.pivots.iter_mut().enumerate() {
            *p = i;
        }

        for k in 0..n {
            // Find pivot
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;

            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_val < PIVOT_EPSILON {
                return Err(SimError::SingularMatrix);
            }

            // Swap rows if needed
            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            // Eliminate
            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                if factor == 0.0 {
                    continue;
                }
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve the system using the pre-computed LU decomposition.
    pub fn solve(&mut self) -> Result<()> {
        let n = self.size;

        // Apply pivot permutation to z
        for i in 0..n {
            self.x[i] = self.z[self.pivots[i]];
        }

        // Forward substitution (L * y = Pb)
        for i in 0..n {
            let mut acc = self.x[i];
            for j in 0..i {
                acc -= self.lu[i * n + j] * self.x[j];
            }
            self.x[i] = acc;
        }

        // Back substitution (U * x = y)
        for i in (0..n).rev() {
            let mut acc = self.x[i];
            for j in (i + 1)..n {
                acc -= self.lu[i * n + j] * self.x[j];
            }
            let diag = self.lu[i * n + i];
            if diag.abs() < PIVOT_EPSILON {
                return Err(SimError::SingularMatrix);
            }
            self.x[i] = acc / diag;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_small_system() {
        // [ 2 1 ] [x0]   [ 5 ]
        // [ 1 3 ] [x1] = [10 ]
        let mut m = MnaMatrix::new(2);
        m.add(0, 0, 2.0);
        m.add(0, 1, 1.0);
        m.add(1, 0, 1.0);
        m.add(1, 1, 3.0);
        m.add_source(0, 5.0);
        m.add_source(1, 10.0);
        m.factor().unwrap();
        m.solve().unwrap();
        assert_relative_eq!(m.x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(m.x[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_needs_pivoting() {
        // Zero on the leading diagonal, as produced by a voltage source row
        let mut m = MnaMatrix::new(2);
        m.add(0, 1, 1.0);
        m.add(1, 0, 1.0);
        m.add_source(0, 2.0);
        m.add_source(1, 7.0);
        m.factor().unwrap();
        m.solve().unwrap();
        assert_relative_eq!(m.x[0], 7.0, epsilon = 1e-12);
        assert_relative_eq!(m.x[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_row_is_singular() {
        let mut m = MnaMatrix::new(2);
        m.add(0, 0, 1.0);
        assert_eq!(m.factor(), Err(SimError::SingularMatrix));
    }

    #[test]
    fn test_dependent_rows_are_singular() {
        let mut m = MnaMatrix::new(2);
        m.add(0, 0, 1.0);
        m.add(0, 1, -1.0);
        m.add(1, 0, -1.0);
        m.add(1, 1, 1.0);
        assert_eq!(m.factor(), Err(SimError::SingularMatrix));
    }

    #[test]
    fn test_cache_and_restore() {
        let mut m = MnaMatrix::new(1);
        m.add(0, 0, 1.0);
        m.add_source(0, 2.0);
        m.cache_linear();
        m.add(0, 0, 5.0);
        m.add_source(0, 5.0);
        m.restore_linear();
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.z[0], 2.0);
    }
}
