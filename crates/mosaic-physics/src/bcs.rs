//! Boundary conditions.

use mosaic_core::{ControlledReal, ParamType, ParameterSet, SetupError, Subsystem};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor};
use mosaic_kernel::{CapabilitySet, Contributor, NodalContributor, NodeView, PropHandle, QpView};

/// Prescribed flux: `-value * φ_i` on the side.
#[derive(Debug)]
pub struct NeumannBc {
    value: ControlledReal,
}

impl Contributor for NeumannBc {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        -self.value.get() * qp.phi(i)
    }
}

/// Flux scaled by a material property: `-value * M * φ_i`.
#[derive(Debug)]
pub struct MatNeumannBc {
    value: ControlledReal,
    material: PropHandle,
}

impl Contributor for MatNeumannBc {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        -self.value.get() * qp.property(self.material) * qp.phi(i)
    }
}

/// Strong `u = value` at boundary nodes.
#[derive(Debug)]
pub struct DirichletBc {
    value: ControlledReal,
}

impl NodalContributor for DirichletBc {
    fn residual(&self, node: &NodeView<'_>) -> f64 {
        node.u() - self.value.get()
    }
}

fn value_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("value", 0.0, "Boundary value");
    crate::controllable(&mut p, "value");
    p
}

fn mat_neumann_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("value", 1.0, "Flux scale");
    crate::controllable(&mut p, "value");
    p.add_required_param(
        "boundary_material",
        ParamType::Str,
        "Material property multiplying the flux",
    );
    p
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), SetupError> {
    registry.register(
        "NeumannBC",
        TypeDescriptor::new(
            Subsystem::BoundaryConditions,
            CapabilitySet::RESIDUAL,
            value_schema,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::IntegratedBc(Box::new(NeumannBc {
                    value: ctx.controlled("value")?,
                })))
            },
        ),
    )?;
    registry.register(
        "MatNeumannBC",
        TypeDescriptor::new(
            Subsystem::BoundaryConditions,
            CapabilitySet::RESIDUAL,
            mat_neumann_schema,
            |ctx| {
                ctx.primary_variable()?;
                let name: String = ctx.param("boundary_material")?;
                Ok(ObjectHandle::IntegratedBc(Box::new(MatNeumannBc {
                    value: ctx.controlled("value")?,
                    material: ctx.material_property(&name)?,
                })))
            },
        ),
    )?;
    registry.register(
        "DirichletBC",
        TypeDescriptor::new(
            Subsystem::BoundaryConditions,
            CapabilitySet::RESIDUAL_JACOBIAN,
            value_schema,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::NodalBc(Box::new(DirichletBc {
                    value: ctx.controlled("value")?,
                })))
            },
        ),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{ElementId, NodeId};
    use mosaic_mesh::Mesh;
    use mosaic_test_utils::Bench;

    fn registry() -> Registry {
        let mut reg = Registry::new();
        register(&mut reg).unwrap();
        reg
    }

    fn params(value: f64) -> ParameterSet {
        ParameterSet::new()
            .with("variable", "u")
            .with("boundary", vec!["right"])
            .with("value", value)
    }

    #[test]
    fn neumann_flux_lands_on_boundary_node() {
        let reg = registry();
        let mut bench = Bench::new(2);
        let u = bench.var("u");
        let bc = match bench
            .create(&reg, Subsystem::BoundaryConditions, "NeumannBC", "flux", &params(2.0))
            .unwrap()
            .handle
        {
            ObjectHandle::IntegratedBc(bc) => bc,
            other => panic!("expected integrated BC, got {other:?}"),
        };
        let mut ctx = bench.context(1, 1.0);
        bench
            .mesh
            .reinit_side(ElementId(1), 1, &mut ctx.data.geom)
            .unwrap();
        ctx.add_residual(bc.as_ref(), u, 0);
        assert!(ctx.local.residual[0].abs() < 1e-12);
        assert!((ctx.local.residual[1] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn dirichlet_residual_and_jacobian() {
        let reg = registry();
        let mut bench = Bench::new(2);
        let u = bench.var("u");
        let created = bench
            .create(&reg, Subsystem::BoundaryConditions, "DirichletBC", "fix", &params(3.0))
            .unwrap();
        assert_eq!(created.restriction.boundaries.len(), 1);
        let mut params = created.params;
        let bc = match created.handle {
            ObjectHandle::NodalBc(bc) => bc,
            other => panic!("expected nodal BC, got {other:?}"),
        };
        let values = [[5.0, 0.0, 0.0]];
        let node = NodeView::new(NodeId(2), [1.0, 0.0, 0.0], &values, u);
        assert_eq!(bc.residual(&node), 2.0);
        assert_eq!(bc.jacobian(&node), 1.0);

        params.set_controlled("value", 5.0).unwrap();
        assert_eq!(bc.residual(&node), 0.0);
    }

    #[test]
    fn mat_neumann_consumes_its_property() {
        let reg = registry();
        let mut bench = Bench::new(2);
        let created = bench
            .create(
                &reg,
                Subsystem::BoundaryConditions,
                "MatNeumannBC",
                "flux",
                &params(2.0).with("boundary_material", "k"),
            )
            .unwrap();
        assert_eq!(created.couplings.properties.len(), 1);
        assert!(bench.properties.id("k").is_some());
        // Nobody declares "k" yet.
        assert!(bench.properties.resolve().is_err());
    }

    #[test]
    fn bcs_need_a_boundary() {
        let reg = registry();
        let mut bench = Bench::new(1);
        let p = ParameterSet::new().with("variable", "u");
        match bench.create(&reg, Subsystem::BoundaryConditions, "DirichletBC", "fix", &p) {
            Err(SetupError::ParameterValidation { object, .. }) => assert_eq!(object, "fix"),
            other => panic!("expected ParameterValidation, got {other:?}"),
        }
    }
}
