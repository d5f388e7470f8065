//! Damped Newton iteration.

use nalgebra::{DMatrix, DVector};

use crate::error::SolverFault;

pub struct NewtonConfig {
    pub max_iterations: usize,
    /// Absolute tolerance on the residual norm.
    pub abs_tol: f64,
    /// Line search backtracking factor.
    pub line_search_beta: f64,
    pub max_line_search_iters: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 40,
            abs_tol: 1e-7,
            line_search_beta: 0.5,
            max_line_search_iters: 20,
        }
    }
}

pub struct NewtonResult {
    pub x: DVector<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
}

/// Newton's method with backtracking on the residual norm.
pub fn newton_solve<F, J>(
    x0: DVector<f64>,
    residual_fn: F,
    jacobian_fn: J,
    config: &NewtonConfig,
) -> Result<NewtonResult, SolverFault>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
    J: Fn(&DVector<f64>) -> DMatrix<f64>,
{
    let mut x = x0;
    let mut r = residual_fn(&x);
    let mut r_norm = r.norm();

    for iter in 0..config.max_iterations {
        if !r_norm.is_finite() {
            return Err(SolverFault::Numeric {
                what: format!("non-finite residual at iteration {iter}"),
            });
        }
        if r_norm < config.abs_tol {
            return Ok(NewtonResult {
                x,
                residual_norm: r_norm,
                iterations: iter,
            });
        }

        let jac = jacobian_fn(&x);
        let dx = jac.lu().solve(&(-r.clone())).ok_or_else(|| SolverFault::Numeric {
            what: "singular Jacobian".to_string(),
        })?;

        let mut alpha = 1.0;
        let mut x_new = &x + &dx;
        let mut r_new = residual_fn(&x_new);
        let mut r_new_norm = r_new.norm();
        for _ in 0..config.max_line_search_iters {
            if r_new_norm < r_norm {
                break;
            }
            alpha *= config.line_search_beta;
            x_new = &x + alpha * &dx;
            r_new = residual_fn(&x_new);
            r_new_norm = r_new.norm();
        }

        x = x_new;
        r = r_new;
        r_norm = r_new_norm;

        if alpha < 1e-10 {
            return Err(SolverFault::ConvergenceFailed {
                what: format!("line search stagnated at iteration {iter}"),
            });
        }
    }

    if r_norm < config.abs_tol {
        return Ok(NewtonResult {
            x,
            residual_norm: r_norm,
            iterations: config.max_iterations,
        });
    }
    Err(SolverFault::ConvergenceFailed {
        what: format!(
            "{} trials reached, residual = {r_norm:e}",
            config.max_iterations
        ),
    })
}
