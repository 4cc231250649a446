//! Thin LP/MIP wrapper around HiGHS.
//!
//! The master problem never touches the solver handle directly. It edits an
//! in-memory mirror (column costs/bounds/coefficients, row bounds) through
//! this wrapper, and every `solve` materialises a fresh HiGHS model from the
//! mirror. That keeps column deletion a pure index-remap on our side and
//! isolates the rest of the optimiser from the solver API.

use highs::{HighsModelStatus, RowProblem, Sense};
use rotor_core::{RotorError, RotorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Other,
}

#[derive(Debug, Clone)]
pub struct LpSolution {
    pub status: LpStatus,
    pub objective: f64,
    pub col_value: Vec<f64>,
    /// Reduced costs of the columns.
    pub col_dual: Vec<f64>,
    pub row_dual: Vec<f64>,
    /// Duals are only meaningful after a pure LP solve.
    pub dual_valid: bool,
}

#[derive(Debug, Clone)]
struct LpCol {
    cost: f64,
    lb: f64,
    ub: f64,
    integer: bool,
    /// `(row, coefficient)` entries of this column.
    entries: Vec<(usize, f64)>,
}

#[derive(Debug, Clone, Copy)]
struct LpRow {
    lb: f64,
    ub: f64,
}

/// The in-memory model mirror.
#[derive(Debug, Default)]
pub struct LpModel {
    cols: Vec<LpCol>,
    rows: Vec<LpRow>,
}

impl LpModel {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn add_col(&mut self, cost: f64, lb: f64, ub: f64, entries: Vec<(usize, f64)>) -> usize {
        debug_assert!(entries.iter().all(|&(row, _)| row < self.rows.len()));
        self.cols.push(LpCol { cost, lb, ub, integer: false, entries });
        self.cols.len() - 1
    }

    pub fn add_row(&mut self, lb: f64, ub: f64) -> usize {
        self.rows.push(LpRow { lb, ub });
        self.rows.len() - 1
    }

    pub fn change_col_cost(&mut self, col: usize, cost: f64) {
        self.cols[col].cost = cost;
    }

    pub fn change_col_bounds(&mut self, col: usize, lb: f64, ub: f64) {
        self.cols[col].lb = lb;
        self.cols[col].ub = ub;
    }

    pub fn change_row_bounds(&mut self, row: usize, lb: f64, ub: f64) {
        self.rows[row] = LpRow { lb, ub };
    }

    pub fn change_col_integrality(&mut self, col: usize, integer: bool) {
        self.cols[col].integer = integer;
    }

    pub fn clear_integrality(&mut self) {
        for col in &mut self.cols {
            col.integer = false;
        }
    }

    /// Sets (or overwrites) one coefficient.
    pub fn change_coeff(&mut self, row: usize, col: usize, value: f64) {
        let entries = &mut self.cols[col].entries;
        match entries.iter_mut().find(|(r, _)| *r == row) {
            Some(entry) => entry.1 = value,
            None => entries.push((row, value)),
        }
    }

    pub fn col_cost(&self, col: usize) -> f64 {
        self.cols[col].cost
    }

    pub fn col_bounds(&self, col: usize) -> (f64, f64) {
        (self.cols[col].lb, self.cols[col].ub)
    }

    pub fn row_bounds(&self, row: usize) -> (f64, f64) {
        (self.rows[row].lb, self.rows[row].ub)
    }

    /// Deletes the flagged columns and returns, for each old column index,
    /// its new index (`None` if deleted). Rows are untouched.
    pub fn delete_cols(&mut self, delete: &[bool]) -> Vec<Option<usize>> {
        debug_assert_eq!(delete.len(), self.cols.len());
        let mut remap = Vec::with_capacity(self.cols.len());
        let mut kept = Vec::with_capacity(self.cols.len());
        for (col, flagged) in self.cols.drain(..).zip(delete) {
            if *flagged {
                remap.push(None);
            } else {
                remap.push(Some(kept.len()));
                kept.push(col);
            }
        }
        self.cols = kept;
        remap
    }

    fn run(&self, mip: bool, time_limit: Option<f64>) -> RotorResult<LpSolution> {
        let mut pb = RowProblem::default();

        let mut handles = Vec::with_capacity(self.cols.len());
        for col in &self.cols {
            let handle = if mip && col.integer {
                pb.add_integer_column(col.cost, col.lb..col.ub)
            } else {
                pb.add_column(col.cost, col.lb..col.ub)
            };
            handles.push(handle);
        }

        // Transpose the column-wise entries into row factor lists.
        let mut row_factors: Vec<Vec<(highs::Col, f64)>> = vec![Vec::new(); self.rows.len()];
        for (col, handle) in self.cols.iter().zip(&handles) {
            for &(row, value) in &col.entries {
                row_factors[row].push((*handle, value));
            }
        }
        for (row, factors) in self.rows.iter().zip(row_factors) {
            pb.add_row(row.lb..row.ub, factors);
        }

        let mut model = pb.optimise(Sense::Minimise);
        model.set_option("output_flag", false);
        if let Some(limit) = time_limit {
            model.set_option("time_limit", limit);
        }

        let solved = model.solve();
        let hit_time_limit = solved.status() == HighsModelStatus::ReachedTimeLimit;
        let status = match solved.status() {
            HighsModelStatus::Optimal => LpStatus::Optimal,
            HighsModelStatus::Infeasible => LpStatus::Infeasible,
            HighsModelStatus::Unbounded | HighsModelStatus::UnboundedOrInfeasible => {
                LpStatus::Unbounded
            }
            // A hit time limit still carries the best feasible point found.
            HighsModelStatus::ReachedTimeLimit => LpStatus::Optimal,
            _ => LpStatus::Other,
        };

        if status != LpStatus::Optimal {
            return Ok(LpSolution {
                status,
                objective: f64::INFINITY,
                col_value: Vec::new(),
                col_dual: Vec::new(),
                row_dual: Vec::new(),
                dual_valid: false,
            });
        }

        let solution = solved.get_solution();
        let col_value = solution.columns().to_vec();
        if col_value.len() != self.cols.len() {
            if hit_time_limit {
                // Ran out of time before any feasible point was found.
                return Ok(LpSolution {
                    status: LpStatus::Other,
                    objective: f64::INFINITY,
                    col_value: Vec::new(),
                    col_dual: Vec::new(),
                    row_dual: Vec::new(),
                    dual_valid: false,
                });
            }
            return Err(RotorError::Solver(
                "solver reported success but returned no primal point".into(),
            ));
        }
        let objective: f64 = self
            .cols
            .iter()
            .zip(&col_value)
            .map(|(col, value)| col.cost * value)
            .sum();

        let col_dual = solution.dual_columns().to_vec();
        let row_dual = solution.dual_rows().to_vec();
        let dual_valid =
            !mip && col_dual.len() == self.cols.len() && row_dual.len() == self.rows.len();

        Ok(LpSolution {
            status,
            objective,
            col_value,
            col_dual,
            row_dual,
            dual_valid,
        })
    }

    /// Solves the continuous relaxation.
    pub fn solve(&self) -> RotorResult<LpSolution> {
        self.run(false, None)
    }

    /// Solves with the marked columns integral, under a wall-clock limit.
    pub fn solve_mip(&self, time_limit_s: f64) -> RotorResult<LpSolution> {
        self.run(true, Some(time_limit_s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// min x + 2y  s.t.  x + y >= 1,  0 <= x,y <= 1
    fn tiny_model() -> LpModel {
        let mut lp = LpModel::new();
        let row = lp.add_row(1.0, f64::INFINITY);
        let x = lp.add_col(1.0, 0.0, 1.0, vec![(row, 1.0)]);
        let y = lp.add_col(2.0, 0.0, 1.0, vec![(row, 1.0)]);
        assert_eq!((x, y), (0, 1));
        lp
    }

    #[test]
    fn test_lp_solve_and_duals() {
        let lp = tiny_model();
        let sol = lp.solve().unwrap();
        assert_eq!(sol.status, LpStatus::Optimal);
        assert!((sol.objective - 1.0).abs() < 1e-6);
        assert!((sol.col_value[0] - 1.0).abs() < 1e-6);
        assert!(sol.dual_valid);
        // Covering row is tight, its dual carries the marginal cost of x.
        assert!((sol.row_dual[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_bounds() {
        let mut lp = tiny_model();
        lp.change_col_bounds(0, 0.0, 0.0);
        lp.change_col_bounds(1, 0.0, 0.0);
        let sol = lp.solve().unwrap();
        assert_eq!(sol.status, LpStatus::Infeasible);
        assert!(!sol.dual_valid);
    }

    #[test]
    fn test_delete_cols_remap() {
        let mut lp = tiny_model();
        let remap = lp.delete_cols(&[true, false]);
        assert_eq!(remap, vec![None, Some(0)]);
        assert_eq!(lp.num_cols(), 1);
        let sol = lp.solve().unwrap();
        assert!((sol.objective - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mip_rounds_up() {
        // min x  s.t.  2x >= 1, x in {0, 1} -> x = 1 under integrality.
        let mut lp = LpModel::new();
        let row = lp.add_row(1.0, f64::INFINITY);
        let x = lp.add_col(1.0, 0.0, 1.0, vec![(row, 2.0)]);
        lp.change_col_integrality(x, true);
        let relaxed = lp.solve().unwrap();
        assert!((relaxed.col_value[0] - 0.5).abs() < 1e-6);
        let integral = lp.solve_mip(10.0).unwrap();
        assert!((integral.col_value[0] - 1.0).abs() < 1e-6);
    }
}
