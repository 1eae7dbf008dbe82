//! Forward-mode dual numbers for AD contributors.
//!
//! [`Dual`] is `num_dual::Dual64`: a value `re` and one directional
//! derivative `eps`. The AD adapter seeds the derivative with the trial
//! shape function of the variable being differentiated, evaluates the
//! residual, and reads the Jacobian entry back from `eps`. Elementary
//! functions (`powi`, `sqrt`, `exp`, ...) come from [`DualNum`].

use mosaic_mesh::Point;

pub use num_dual::{Dual64 as Dual, DualNum};

/// A value with zero derivative.
pub fn constant(v: f64) -> Dual {
    Dual::from(v)
}

/// Dot product of a dual-valued gradient with a plain vector.
pub fn dot(a: &[Dual; 3], b: &Point) -> Dual {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// All three components of a gradient constant.
pub(crate) fn constant_grad(g: Point) -> [Dual; 3] {
    [constant(g[0]), constant(g[1]), constant(g[2])]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
    }

    #[test]
    fn product_and_quotient_rules() {
        let x = Dual::new(3.0, 1.0);
        let y = x * x * 2.0 + 1.0;
        assert!(close(y.re, 19.0));
        assert!(close(y.eps, 12.0));
        let q = constant(1.0) / x;
        assert!(close(q.eps, -1.0 / 9.0));
    }

    #[test]
    fn elementary_functions() {
        let x = Dual::new(4.0, 1.0);
        assert!(close(x.sqrt().eps, 0.25));
        assert!(close(x.ln().eps, 0.25));
        assert!(close(x.exp().eps, 4.0f64.exp()));
        assert!(close(x.powi(3).eps, 48.0));
    }

    #[test]
    fn gradient_dot() {
        let g = [Dual::new(1.0, 2.0), Dual::new(3.0, 0.5), constant(7.0)];
        let d = dot(&g, &[2.0, 4.0, 0.0]);
        assert!(close(d.re, 14.0));
        assert!(close(d.eps, 6.0));
    }

    proptest! {
        // Derivative of a polynomial matches a central difference.
        #[test]
        fn derivative_matches_finite_difference(x in -5.0f64..5.0, a in -3.0f64..3.0) {
            let f = |u: Dual| u.powi(3) * a - u * 2.0 + (u * u).exp() * 0.01;
            let exact = f(Dual::new(x, 1.0)).eps;
            let h = 1e-6;
            let fd = (f(constant(x + h)).re - f(constant(x - h)).re) / (2.0 * h);
            prop_assert!((exact - fd).abs() <= 1e-4 * (1.0 + exact.abs()));
        }
    }
}
