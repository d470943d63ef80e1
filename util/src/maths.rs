//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Limit a value to the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T 
where
    T: Float
{
    if value > max {
        max
    }
    else if value < min {
        min
    }
    else {
        value
    }
}

/// Move a value towards zero by `step`, stopping at zero rather than crossing it.
pub fn step_towards_zero<T>(value: T, step: T) -> T
where
    T: Float
{
    if value > T::zero() {
        (value - step).max(T::zero())
    }
    else {
        (value + step).min(T::zero())
    }
}

/// Logistic function, maps a log-odds value onto a probability in `[0, 1]`.
pub fn logistic<T>(value: T) -> T
where
    T: Float
{
    T::one() - T::one() / (T::one() + value.exp())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0, 1.0), (0.0, 100.0), 0.25), 25.0);
        assert_eq!(lin_map((-1.0, 1.0), (0.0, 10.0), 0.0), 5.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5.0, -2.0, 3.5), 3.5);
        assert_eq!(clamp(-5.0, -2.0, 3.5), -2.0);
        assert_eq!(clamp(1.0, -2.0, 3.5), 1.0);
    }

    #[test]
    fn test_step_towards_zero() {
        assert_eq!(step_towards_zero(1.0, 0.25), 0.75);
        assert_eq!(step_towards_zero(-1.0, 0.25), -0.75);
        assert_eq!(step_towards_zero(0.1, 0.25), 0.0);
        assert_eq!(step_towards_zero(-0.1, 0.25), 0.0);
        assert_eq!(step_towards_zero(0.0, 0.25), 0.0);
    }

    #[test]
    fn test_logistic() {
        assert_eq!(logistic(0.0), 0.5);
        assert!(logistic(10.0) > 0.99);
        assert!(logistic(-10.0) < 0.01);
    }
}
