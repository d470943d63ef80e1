//! # Bayesian log-odds updater
//!
//! Evidence is fused additively in log-odds space. Each hit adds `l_occ` and each miss subtracts
//! `l_free`, after which the value is clamped to `[l_min, l_max]` so that the grid can always
//! recover from stale evidence.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use util::maths::{clamp, logistic, step_towards_zero};

use crate::{params::UpdaterParams, ray::Evidence};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BayesUpdater {
    params: UpdaterParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Classification of a cell's log-odds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    Free,
    Unknown,
    Occupied,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BayesUpdater {
    pub fn new(params: UpdaterParams) -> Self {
        Self { params }
    }

    /// Apply one piece of evidence to a cell's log-odds.
    pub fn apply(&self, value: &mut f64, evidence: Evidence) {
        let updated = match evidence {
            Evidence::Hit => *value + self.params.l_occ,
            Evidence::Miss => *value - self.params.l_free,
        };

        *value = clamp(updated, self.params.l_min, self.params.l_max);
    }

    /// Move a cell which received no evidence this cycle towards the unknown prior.
    ///
    /// Returns `true` if the value changed.
    pub fn decay(&self, value: &mut f64) -> bool {
        let rate = match self.params.decay_rate {
            Some(r) if r > 0.0 => r,
            _ => return false,
        };

        if *value == 0.0 {
            return false;
        }

        *value = step_towards_zero(*value, rate);
        true
    }

    /// Whether decay is configured.
    pub fn decays(&self) -> bool {
        matches!(self.params.decay_rate, Some(r) if r > 0.0)
    }

    pub fn classify(&self, value: f64) -> CellState {
        if value <= self.params.t_free {
            CellState::Free
        } else if value >= self.params.t_occ {
            CellState::Occupied
        } else {
            CellState::Unknown
        }
    }

    /// Probability of occupancy for the given log-odds.
    pub fn probability(value: f64) -> f64 {
        logistic(value)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::test::test_params;
    use proptest::prelude::*;

    fn updater() -> BayesUpdater {
        BayesUpdater::new(test_params().updater)
    }

    #[test]
    fn test_apply() {
        let u = updater();
        let mut v = 0.0;

        u.apply(&mut v, Evidence::Hit);
        assert_eq!(v, 0.85);

        u.apply(&mut v, Evidence::Miss);
        assert!((v - 0.45).abs() < 1e-12);

        for _ in 0..10 {
            u.apply(&mut v, Evidence::Hit);
        }
        assert_eq!(v, 3.5);

        for _ in 0..20 {
            u.apply(&mut v, Evidence::Miss);
        }
        assert_eq!(v, -2.0);
    }

    #[test]
    fn test_decay() {
        let mut params = test_params().updater;
        params.decay_rate = Some(0.3);
        let u = BayesUpdater::new(params);

        let mut v = 0.5;
        assert!(u.decay(&mut v));
        assert!((v - 0.2).abs() < 1e-12);
        assert!(u.decay(&mut v));
        assert_eq!(v, 0.0);
        assert!(!u.decay(&mut v));

        let mut v = -0.4;
        u.decay(&mut v);
        assert!((v + 0.1).abs() < 1e-12);

        // No decay configured
        let mut v = 0.5;
        assert!(!updater().decay(&mut v));
        assert_eq!(v, 0.5);
        assert!(!updater().decays());
    }

    #[test]
    fn test_classify() {
        let u = updater();

        assert_eq!(u.classify(0.0), CellState::Unknown);
        assert_eq!(u.classify(-0.4), CellState::Free);
        assert_eq!(u.classify(-2.0), CellState::Free);
        assert_eq!(u.classify(0.85), CellState::Occupied);
        assert_eq!(u.classify(0.84), CellState::Unknown);

        let values = [-2.0, -0.5, 0.0, 0.3, 0.9, 3.5];
        let first: Vec<CellState> = values.iter().map(|v| u.classify(*v)).collect();
        let second: Vec<CellState> = values.iter().map(|v| u.classify(*v)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_probability() {
        assert_eq!(BayesUpdater::probability(0.0), 0.5);
        assert!(BayesUpdater::probability(3.5) > 0.97);
        assert!(BayesUpdater::probability(-2.0) < 0.12);
    }

    proptest! {
        #[test]
        fn value_stays_clamped(
            evidence in proptest::collection::vec(any::<bool>(), 0..200),
            decay in proptest::option::of(0.0f64..1.0),
        ) {
            let mut params = test_params().updater;
            params.decay_rate = decay;
            let u = BayesUpdater::new(params);

            let mut v = 0.0;
            for (i, hit) in evidence.into_iter().enumerate() {
                match hit {
                    true => u.apply(&mut v, Evidence::Hit),
                    false => u.apply(&mut v, Evidence::Miss),
                }
                if i % 3 == 0 {
                    u.decay(&mut v);
                }
                prop_assert!(v >= -2.0 && v <= 3.5);
            }
        }
    }
}
