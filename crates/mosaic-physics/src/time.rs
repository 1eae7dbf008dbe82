//! Time derivative kernels.

use mosaic_core::{ParameterSet, SetupError, Subsystem};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor};
use mosaic_kernel::{CapabilitySet, Contributor, QpView};

/// `u̇ * φ_i`, with `u̇` from the backward-difference history.
#[derive(Debug, Default)]
pub struct TimeDerivative;

impl Contributor for TimeDerivative {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        qp.u_dot() * qp.phi(i)
    }

    fn jacobian(&self, qp: &QpView<'_>, i: usize, j: usize) -> f64 {
        qp.du_dot_du() * qp.phi(j) * qp.phi(i)
    }
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), SetupError> {
    registry.register(
        "TimeDerivative",
        TypeDescriptor::new(
            Subsystem::Kernels,
            CapabilitySet::RESIDUAL_JACOBIAN,
            ParameterSet::new,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::Kernel(Box::new(TimeDerivative)))
            },
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_test_utils::Bench;

    #[test]
    fn residual_uses_backward_difference() {
        let mut reg = Registry::new();
        register(&mut reg).unwrap();
        let mut bench = Bench::new(1);
        let u = bench.var("u");
        let k = match bench
            .create(
                &reg,
                Subsystem::Kernels,
                "TimeDerivative",
                "dt",
                &ParameterSet::new().with("variable", "u"),
            )
            .unwrap()
            .handle
        {
            ObjectHandle::Kernel(k) => k,
            other => panic!("expected kernel, got {other:?}"),
        };
        bench.advance();
        bench.set("u", &[1.0, 1.0]);

        let mut ctx = bench.context(0, 0.5);
        ctx.add_residual(k.as_ref(), u, 0);
        ctx.add_jacobian(k.as_ref(), u, 0, None);
        // u̇ = (1 - 0) / 0.5 = 2, ∫φ_0 = 1/2.
        assert!((ctx.local.residual[0] - 1.0).abs() < 1e-12);
        // du̇/du = 2, mass matrix diagonal 1/3.
        assert!((ctx.local.jacobian[(0, 0)] - 2.0 / 3.0).abs() < 1e-12);
    }
}
