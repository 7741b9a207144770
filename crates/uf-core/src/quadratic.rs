//! Real-root solver for `a·x² + b·x + c = 0`.
//!
//! Two distinct real roots are returned in ascending order so callers can apply
//! the smaller-root tie-break. A negative discriminant is reported as
//! [`QuadraticRoots::Complex`] and never collapsed into a real value.

use crate::numeric::Real;

/// Outcome of solving a quadratic equation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadraticRoots {
    /// Two distinct real roots, `lo < hi`.
    Two { lo: Real, hi: Real },
    /// A repeated root, or the single root of the linear case `a == 0`.
    One(Real),
    /// Negative discriminant: complex-conjugate pair `re ± i·im`.
    Complex { re: Real, im: Real },
    /// `a == b == 0`: no unique root.
    Degenerate,
}

impl QuadraticRoots {
    /// The smaller real root, if any real root exists.
    pub fn smallest_real(&self) -> Option<Real> {
        match *self {
            Self::Two { lo, .. } => Some(lo),
            Self::One(x) => Some(x),
            Self::Complex { .. } | Self::Degenerate => None,
        }
    }

    pub fn has_real_root(&self) -> bool {
        self.smallest_real().is_some()
    }
}

/// Solve `a·x² + b·x + c = 0`.
///
/// Uses the cancellation-free form `q = -(b + sign(b)·√Δ)/2`, `x₁ = q/a`,
/// `x₂ = c/q`.
pub fn solve_quadratic(a: Real, b: Real, c: Real) -> QuadraticRoots {
    if a == 0.0 {
        if b == 0.0 {
            return QuadraticRoots::Degenerate;
        }
        return QuadraticRoots::One(-c / b);
    }

    let disc = b * b - 4.0 * a * c;
    if disc > 0.0 {
        let sq = disc.sqrt();
        let q = -0.5 * (b + b.signum() * sq);
        let x1 = q / a;
        let x2 = c / q;
        let (lo, hi) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        QuadraticRoots::Two { lo, hi }
    } else if disc < 0.0 {
        QuadraticRoots::Complex {
            re: -b / (2.0 * a),
            im: (-disc).sqrt() / (2.0 * a).abs(),
        }
    } else {
        QuadraticRoots::One(-b / (2.0 * a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_roots_sorted() {
        // (x-1)(x-2)
        match solve_quadratic(1.0, -3.0, 2.0) {
            QuadraticRoots::Two { lo, hi } => {
                assert!((lo - 1.0).abs() < 1e-12);
                assert!((hi - 2.0).abs() < 1e-12);
            }
            other => panic!("expected two roots, got {other:?}"),
        }
    }

    #[test]
    fn negative_leading_coefficient() {
        // -(x+1)(x-3) = -x^2 + 2x + 3
        let roots = solve_quadratic(-1.0, 2.0, 3.0);
        assert_eq!(roots.smallest_real(), Some(-1.0));
    }

    #[test]
    fn repeated_root() {
        assert_eq!(solve_quadratic(1.0, -4.0, 4.0), QuadraticRoots::One(2.0));
    }

    #[test]
    fn complex_has_no_real_root() {
        let roots = solve_quadratic(1.0, 0.0, 1.0);
        assert!(!roots.has_real_root());
        match roots {
            QuadraticRoots::Complex { re, im } => {
                assert_eq!(re, 0.0);
                assert!((im - 1.0).abs() < 1e-12);
            }
            other => panic!("expected complex pair, got {other:?}"),
        }
    }

    #[test]
    fn linear_and_degenerate() {
        assert_eq!(solve_quadratic(0.0, 2.0, -4.0), QuadraticRoots::One(2.0));
        assert_eq!(solve_quadratic(0.0, 0.0, 1.0), QuadraticRoots::Degenerate);
    }

    #[test]
    fn small_a_is_not_swamped_by_cancellation() {
        // a tiny: roots near -c/b and -b/a
        let roots = solve_quadratic(1e-10, 1.0, -1.0);
        let QuadraticRoots::Two { lo, hi } = roots else {
            panic!("expected two roots");
        };
        assert!((hi - 1.0).abs() < 1e-8);
        assert!(lo < -1e9);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn real_roots_satisfy_equation(
            a in prop_oneof![-10.0_f64..-0.01, 0.01_f64..10.0],
            b in -10.0_f64..10.0,
            c in -10.0_f64..10.0,
        ) {
            if let Some(x) = solve_quadratic(a, b, c).smallest_real() {
                let residual = a * x * x + b * x + c;
                let scale = 1.0 + (a * x * x).abs() + (b * x).abs() + c.abs();
                prop_assert!(residual.abs() <= 1e-9 * scale);
            } else {
                prop_assert!(b * b - 4.0 * a * c < 0.0);
            }
        }
    }
}
