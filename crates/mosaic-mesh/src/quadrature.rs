//! Gauss-Legendre quadrature on the reference interval `[-1, 1]`.

use crate::error::MeshError;

/// Highest supported number of points per direction.
pub const MAX_GAUSS_POINTS: usize = 4;

/// Points and weights of an n-point Gauss-Legendre rule, `1 <= n <= 4`.
///
/// An n-point rule integrates polynomials of degree `2n - 1` exactly.
pub fn gauss_legendre(n: usize) -> Result<(Vec<f64>, Vec<f64>), MeshError> {
    let (points, weights): (&[f64], &[f64]) = match n {
        1 => (&[0.0], &[2.0]),
        2 => {
            const A: f64 = 0.577_350_269_189_625_8;
            (&[-A, A], &[1.0, 1.0])
        }
        3 => {
            const A: f64 = 0.774_596_669_241_483_4;
            (&[-A, 0.0, A], &[5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0])
        }
        4 => {
            const A: f64 = 0.339_981_043_584_856_3;
            const B: f64 = 0.861_136_311_594_052_6;
            const WA: f64 = 0.652_145_154_862_546_1;
            const WB: f64 = 0.347_854_845_137_453_9;
            (&[-B, -A, A, B], &[WB, WA, WA, WB])
        }
        _ => {
            return Err(MeshError::InvalidGeometry {
                reason: format!("gauss rule with {n} points (supported: 1..={MAX_GAUSS_POINTS})"),
            })
        }
    };
    Ok((points.to_vec(), weights.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_interval_length() {
        for n in 1..=MAX_GAUSS_POINTS {
            let (_, w) = gauss_legendre(n).unwrap();
            let s: f64 = w.iter().sum();
            assert!((s - 2.0).abs() < 1e-14, "n={n}: sum={s}");
        }
    }

    #[test]
    fn integrates_polynomials_exactly() {
        // ∫_{-1}^{1} x^k dx = 2/(k+1) for even k, 0 for odd k.
        for n in 1..=MAX_GAUSS_POINTS {
            let (x, w) = gauss_legendre(n).unwrap();
            for k in 0..(2 * n) {
                let got: f64 = x.iter().zip(&w).map(|(x, w)| w * x.powi(k as i32)).sum();
                let want = if k % 2 == 0 { 2.0 / (k as f64 + 1.0) } else { 0.0 };
                assert!((got - want).abs() < 1e-12, "n={n} k={k}: {got} vs {want}");
            }
        }
    }

    #[test]
    fn rejects_unsupported_order() {
        assert!(gauss_legendre(0).is_err());
        assert!(gauss_legendre(5).is_err());
    }
}
