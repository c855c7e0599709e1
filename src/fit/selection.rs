//! Multi-start selection.
//!
//! A local optimizer only finds the basin it starts in. [`minimize_global`]
//! runs it from several starting points (in parallel) and keeps the lowest
//! cost. Selection is deterministic: ties are broken by start index.

use log::debug;
use rayon::prelude::*;

use crate::error::FitError;

/// Best run out of a multi-start search.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalMinimum<T> {
    /// Index of the winning start in the caller's list.
    pub start_index: usize,
    pub value: T,
    pub cost: f64,
}

#[derive(Debug)]
struct Candidate<T> {
    idx: usize,
    value: T,
    cost: f64,
}

/// Run `local` from every start and return the lowest-cost outcome.
///
/// `local` returns the optimized value and its cost. Runs that fail, or that
/// report a non-finite cost, are dropped. If every run fails, the error from
/// the first start is returned.
pub fn minimize_global<T, F>(starts: &[Vec<f64>], local: F) -> Result<GlobalMinimum<T>, FitError>
where
    T: Send,
    F: Fn(&[f64]) -> Result<(T, f64), FitError> + Sync,
{
    if starts.is_empty() {
        return Err(FitError::shape("multi-start search needs at least one start"));
    }

    let outcomes: Vec<Result<Candidate<T>, FitError>> = starts
        .par_iter()
        .enumerate()
        .map(|(idx, start)| {
            let (value, cost) = local(start)?;
            if !cost.is_finite() {
                return Err(FitError::domain(format!("start {idx} produced a non-finite cost")));
            }
            Ok(Candidate { idx, value, cost })
        })
        .collect();

    let mut best: Option<Candidate<T>> = None;
    let mut first_error: Option<FitError> = None;
    for outcome in outcomes {
        match outcome {
            Ok(c) => {
                let better = match &best {
                    None => true,
                    Some(b) => c.cost < b.cost || (c.cost == b.cost && c.idx < b.idx),
                };
                if better {
                    best = Some(c);
                }
            }
            Err(err) => {
                debug!("multi-start run failed: {err}");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match (best, first_error) {
        (Some(b), _) => Ok(GlobalMinimum {
            start_index: b.idx,
            value: b.value,
            cost: b.cost,
        }),
        (None, Some(err)) => Err(err),
        (None, None) => Err(FitError::shape("multi-start search produced no runs")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_lowest_cost() {
        let starts = vec![vec![3.0], vec![-1.0], vec![0.5]];
        let best = minimize_global(&starts, |x| Ok((x[0], x[0] * x[0]))).unwrap();
        assert_eq!(best.start_index, 2);
        assert_eq!(best.value, 0.5);
    }

    #[test]
    fn ties_go_to_the_earliest_start() {
        let starts = vec![vec![2.0], vec![-1.0], vec![1.0]];
        let best = minimize_global(&starts, |x| Ok(((), x[0].abs()))).unwrap();
        assert_eq!(best.start_index, 1);
    }

    #[test]
    fn failed_runs_are_skipped() {
        let starts = vec![vec![-1.0], vec![4.0], vec![2.0]];
        let best = minimize_global(&starts, |x| {
            if x[0] < 0.0 {
                Err(FitError::domain("negative start"))
            } else {
                Ok((x[0], x[0]))
            }
        })
        .unwrap();
        assert_eq!(best.start_index, 2);
    }

    #[test]
    fn all_failures_return_first_error() {
        let starts = vec![vec![1.0], vec![2.0]];
        let err = minimize_global::<(), _>(&starts, |x| {
            if x[0] == 1.0 {
                Err(FitError::convergence(7, "first"))
            } else {
                Err(FitError::domain("second"))
            }
        })
        .unwrap_err();
        assert!(matches!(err, FitError::Convergence { iterations: 7, .. }));
    }

    #[test]
    fn empty_start_list_is_a_shape_error() {
        let err = minimize_global::<(), _>(&[], |_| Ok(((), 0.0))).unwrap_err();
        assert!(matches!(err, FitError::Shape(_)));
    }
}
