//! Levenberg-Marquardt for block-structured reprojection problems.
//!
//! Residuals are grouped in blocks (one per calibration view). Every block
//! depends on a prefix of "shared" parameters (intrinsics, relative pose)
//! plus a private range (that view's pose), which keeps finite-difference
//! Jacobians cheap: perturbing a private parameter only re-evaluates one
//! block. The iteration itself is `levenberg_marquardt::LevenbergMarquardt`.

use std::ops::Range;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use lm_nalgebra::{storage::Owned, Dyn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Stop after about `max_iters` iterations or once the relative parameter
/// step (and relative cost reduction) falls below `epsilon`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermCriteria {
    pub max_iters: usize,
    pub epsilon: f64,
}

impl TermCriteria {
    pub const fn new(max_iters: usize, epsilon: f64) -> Self {
        Self { max_iters, epsilon }
    }

    fn solver(&self) -> LevenbergMarquardt<f64> {
        LevenbergMarquardt::new()
            .with_xtol(self.epsilon)
            .with_ftol(self.epsilon)
            .with_patience(self.max_iters.max(1))
    }
}

pub trait BlockProblem {
    fn num_params(&self) -> usize;
    /// Parameters `[0, shared)` influence every block.
    fn shared_params(&self) -> usize;
    fn num_blocks(&self) -> usize;
    fn block_len(&self, block: usize) -> usize;
    /// Private parameters of `block`; disjoint from the shared prefix.
    fn block_params(&self, block: usize) -> Range<usize>;
    fn block_residuals(&self, x: &[f64], block: usize, out: &mut [f64]);
}

#[derive(Clone, Debug)]
pub struct LmReport {
    pub params: DVector<f64>,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    /// Residual evaluations spent by the solver.
    pub evaluations: usize,
    pub converged: bool,
}

fn block_offsets<P: BlockProblem>(p: &P) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(p.num_blocks() + 1);
    let mut acc = 0;
    offsets.push(0);
    for b in 0..p.num_blocks() {
        acc += p.block_len(b);
        offsets.push(acc);
    }
    offsets
}

fn residuals<P: BlockProblem>(p: &P, x: &[f64], offsets: &[usize]) -> DVector<f64> {
    let mut r = DVector::zeros(offsets[offsets.len() - 1]);
    for b in 0..p.num_blocks() {
        p.block_residuals(x, b, &mut r.as_mut_slice()[offsets[b]..offsets[b + 1]]);
    }
    r
}
/// Central-difference Jacobian exploiting the block structure.
fn jacobian<P: BlockProblem>(p: &P, x: &[f64], offsets: &[usize]) -> DMatrix<f64> {
    let m = offsets[offsets.len() - 1];
    let mut jac = DMatrix::zeros(m, p.num_params());
    let mut xp = x.to_vec();
    let mut plus = vec![0.0; m];
    let mut minus = vec![0.0; m];
    let step_for = |v: f64| 1e-6 * v.abs().max(1e-2);

    let mut diff_column = |j: usize, blocks: &mut dyn Iterator<Item = usize>, jac: &mut DMatrix<f64>| {
        let h = step_for(x[j]);
        let blocks: Vec<usize> = blocks.collect();
        xp[j] = x[j] + h;
        for &b in &blocks {
            p.block_residuals(&xp, b, &mut plus[offsets[b]..offsets[b + 1]]);
        }
        xp[j] = x[j] - h;
        for &b in &blocks {
            p.block_residuals(&xp, b, &mut minus[offsets[b]..offsets[b + 1]]);
        }
        xp[j] = x[j];
        for &b in &blocks {
            for i in offsets[b]..offsets[b + 1] {
                jac[(i, j)] = (plus[i] - minus[i]) / (2.0 * h);
            }
        }
    };

    for j in 0..p.shared_params() {
        diff_column(j, &mut (0..p.num_blocks()), &mut jac);
    }
    for b in 0..p.num_blocks() {
        for j in p.block_params(b) {
            diff_column(j, &mut std::iter::once(b), &mut jac);
        }
    }
    jac
}

/// Adapts a [`BlockProblem`] to the solver crate, which is built on its own
/// nalgebra release; vectors cross the boundary as column-major slices.
struct BlockLeastSquares<'a, P: BlockProblem> {
    problem: &'a P,
    offsets: Vec<usize>,
    params: DVector<f64>,
}

impl<P: BlockProblem> LeastSquaresProblem<f64, Dyn, Dyn> for BlockLeastSquares<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &lm_nalgebra::DVector<f64>) {
        self.params = DVector::from_column_slice(x.as_slice());
    }

    fn params(&self) -> lm_nalgebra::DVector<f64> {
        lm_nalgebra::DVector::from_column_slice(self.params.as_slice())
    }

    fn residuals(&self) -> Option<lm_nalgebra::DVector<f64>> {
        let r = residuals(self.problem, self.params.as_slice(), &self.offsets);
        r.iter()
            .all(|v| v.is_finite())
            .then(|| lm_nalgebra::DVector::from_column_slice(r.as_slice()))
    }

    fn jacobian(&self) -> Option<lm_nalgebra::DMatrix<f64>> {
        let jac = jacobian(self.problem, self.params.as_slice(), &self.offsets);
        jac.iter().all(|v| v.is_finite()).then(|| {
            lm_nalgebra::DMatrix::from_column_slice(jac.nrows(), jac.ncols(), jac.as_slice())
        })
    }
}

/// Minimise the summed squared residuals of `problem` starting from `x0`.
pub fn levenberg_marquardt<P: BlockProblem>(
    problem: &P,
    x0: DVector<f64>,
    term: TermCriteria,
) -> LmReport {
    let wrapper = BlockLeastSquares {
        problem,
        offsets: block_offsets(problem),
        params: x0,
    };
    let (wrapper, report) = term.solver().minimize(wrapper);
    let converged = report.termination.was_successful();
    log::trace!(
        "lm: {:?} after {} evaluations",
        report.termination,
        report.number_of_evaluations
    );
    let cost = residuals(problem, wrapper.params.as_slice(), &wrapper.offsets).norm_squared();
    LmReport {
        params: wrapper.params,
        cost,
        evaluations: report.number_of_evaluations,
        converged,
    }
}
