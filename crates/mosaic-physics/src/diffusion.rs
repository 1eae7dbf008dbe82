//! Diffusion kernels: `-∇·(k ∇u)` in weak form.

use mosaic_core::{ControlledReal, ParameterSet, SetupError, Subsystem};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor};
use mosaic_kernel::dual::{self, Dual};
use mosaic_kernel::{
    AdAdapter, AdContributor, CapabilitySet, Contributor, DualQp, PropHandle, QpView,
};

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// `coeff * ∇u · ∇φ_i` with a hand-written Jacobian.
#[derive(Debug)]
pub struct Diffusion {
    coeff: ControlledReal,
}

impl Contributor for Diffusion {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        self.coeff.get() * dot(qp.grad_u(), qp.grad_phi(i))
    }

    fn jacobian(&self, qp: &QpView<'_>, i: usize, j: usize) -> f64 {
        self.coeff.get() * dot(qp.grad_phi(j), qp.grad_phi(i))
    }
}

/// The same operator, differentiated automatically.
#[derive(Debug)]
pub struct AdDiffusion {
    coeff: ControlledReal,
}

impl AdContributor for AdDiffusion {
    fn residual(&self, qp: &DualQp<'_, '_>, i: usize) -> Dual {
        dual::dot(&qp.grad_u(), &qp.grad_phi(i)) * self.coeff.get()
    }
}

/// `D * ∇u · ∇φ_i` with `D` read from a material property.
///
/// The Jacobian treats `D` as independent of `u`.
#[derive(Debug)]
pub struct MatDiffusion {
    diffusivity: PropHandle,
}

impl Contributor for MatDiffusion {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        qp.property(self.diffusivity) * dot(qp.grad_u(), qp.grad_phi(i))
    }

    fn jacobian(&self, qp: &QpView<'_>, i: usize, j: usize) -> f64 {
        qp.property(self.diffusivity) * dot(qp.grad_phi(j), qp.grad_phi(i))
    }
}

fn diffusion_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("coeff", 1.0, "Diffusion coefficient")
        .range("coeff", 0.0, f64::MAX);
    crate::controllable(&mut p, "coeff");
    p
}

fn mat_diffusion_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param(
        "diffusivity",
        "diffusivity",
        "Name of the material property holding the coefficient",
    );
    p
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), SetupError> {
    let manual = TypeDescriptor::new(
        Subsystem::Kernels,
        CapabilitySet::RESIDUAL_JACOBIAN,
        diffusion_schema,
        |ctx| {
            ctx.primary_variable()?;
            Ok(ObjectHandle::Kernel(Box::new(Diffusion {
                coeff: ctx.controlled("coeff")?,
            })))
        },
    );
    let ad = TypeDescriptor::new(
        Subsystem::Kernels,
        CapabilitySet::AD,
        diffusion_schema,
        |ctx| {
            ctx.primary_variable()?;
            Ok(ObjectHandle::Kernel(Box::new(AdAdapter(AdDiffusion {
                coeff: ctx.controlled("coeff")?,
            }))))
        },
    );
    registry.register_variants("Diffusion", manual, ad)?;
    registry.register_renamed("SimpleDiffusion", "Diffusion", "renamed to Diffusion")?;

    registry.register(
        "MatDiffusion",
        TypeDescriptor::new(
            Subsystem::Kernels,
            CapabilitySet::RESIDUAL_JACOBIAN,
            mat_diffusion_schema,
            |ctx| {
                ctx.primary_variable()?;
                let name: String = ctx.param("diffusivity")?;
                Ok(ObjectHandle::Kernel(Box::new(MatDiffusion {
                    diffusivity: ctx.material_property(&name)?,
                })))
            },
        ),
    )?;
    Ok(())
}
