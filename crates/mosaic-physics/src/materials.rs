//! Materials.

use mosaic_core::{ParamType, ParameterSet, SetupError, Subsystem};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor};
use mosaic_kernel::{
    Capability, CapabilitySet, DeclaredProp, Material, PropHandle, PropertyWriter, QpView,
};

/// Constant-valued properties, one per name.
#[derive(Debug)]
pub struct GenericConstantMaterial {
    props: Vec<(DeclaredProp, f64)>,
}

impl Material for GenericConstantMaterial {
    fn compute_qp_properties(&self, _qp: &QpView<'_>, out: &mut PropertyWriter) {
        for &(prop, value) in &self.props {
            out.set(prop, value);
        }
    }
}

/// Accumulates its variable over accepted steps: `h = h_old + u`.
#[derive(Debug)]
pub struct HistoryMaterial {
    current: DeclaredProp,
    old: PropHandle,
}

impl Material for HistoryMaterial {
    fn compute_qp_properties(&self, qp: &QpView<'_>, out: &mut PropertyWriter) {
        out.set(self.current, qp.property(self.old) + qp.u());
    }

    fn init_qp_stateful_properties(&self, _qp: &QpView<'_>, out: &mut PropertyWriter) {
        out.set(self.current, 0.0);
    }
}

fn constant_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_required_param("prop_names", ParamType::StrVec, "Property names")
        .add_required_param("prop_values", ParamType::RealVec, "Values, one per name");
    p
}

fn history_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_required_param("variable", ParamType::Str, "Variable to accumulate")
        .add_param("prop_name", "history", "Name of the declared property");
    p
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), SetupError> {
    registry.register(
        "GenericConstantMaterial",
        TypeDescriptor::new(
            Subsystem::Materials,
            CapabilitySet::EMPTY,
            constant_schema,
            |ctx| {
                let names: Vec<String> = ctx.param("prop_names")?;
                let values: Vec<f64> = ctx.param("prop_values")?;
                if names.len() != values.len() {
                    return Err(SetupError::InvalidState {
                        reason: format!(
                            "'{}' has {} prop_names but {} prop_values",
                            ctx.name(),
                            names.len(),
                            values.len()
                        ),
                    });
                }
                let mut props = Vec::with_capacity(names.len());
                for (name, value) in names.iter().zip(values) {
                    props.push((ctx.declare_property(name)?, value));
                }
                Ok(ObjectHandle::Material(Box::new(GenericConstantMaterial {
                    props,
                })))
            },
        ),
    )?;
    registry.register(
        "HistoryMaterial",
        TypeDescriptor::new(
            Subsystem::Materials,
            CapabilitySet::of(&[Capability::Stateful]),
            history_schema,
            |ctx| {
                ctx.primary_variable()?;
                let name: String = ctx.param("prop_name")?;
                let current = ctx.declare_stateful_property(&name)?;
                let old = ctx.material_property_old(&name)?;
                Ok(ObjectHandle::Material(Box::new(HistoryMaterial { current, old })))
            },
        ),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_store::State;
    use mosaic_test_utils::Bench;

    fn registry() -> Registry {
        let mut reg = Registry::new();
        register(&mut reg).unwrap();
        reg
    }

    fn material(handle: ObjectHandle) -> Box<dyn Material> {
        match handle {
            ObjectHandle::Material(m) => m,
            other => panic!("expected material, got {other:?}"),
        }
    }

    #[test]
    fn constants_fill_every_point() {
        let reg = registry();
        let mut bench = Bench::new(1);
        let params = ParameterSet::new()
            .with("prop_names", vec!["k", "rho"])
            .with("prop_values", vec![2.0, 7.5]);
        let created = bench
            .create(&reg, Subsystem::Materials, "GenericConstantMaterial", "m", &params)
            .unwrap();
        assert_eq!(created.couplings.declared.len(), 2);
        let m = material(created.handle);
        let rho = bench.properties.id("rho").unwrap();

        let mut ctx = bench.context(0, 1.0);
        ctx.run_material(m.as_ref(), None, false);
        for qp in 0..ctx.data.geom.n_qp() {
            assert_eq!(ctx.data.props.get(rho, State::Current, qp), 7.5);
        }
        assert!(bench.properties.resolve().is_ok());
    }

    #[test]
    fn constants_length_mismatch() {
        let reg = registry();
        let mut bench = Bench::new(1);
        let params = ParameterSet::new()
            .with("prop_names", vec!["k", "rho"])
            .with("prop_values", vec![2.0]);
        match bench.create(&reg, Subsystem::Materials, "GenericConstantMaterial", "m", &params) {
            Err(SetupError::InvalidState { reason }) => assert!(reason.contains("'m'"), "{reason}"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn history_accumulates_from_old_state() {
        let reg = registry();
        let mut bench = Bench::new(1);
        let u = bench.var("u");
        let created = bench
            .create(
                &reg,
                Subsystem::Materials,
                "HistoryMaterial",
                "hist",
                &ParameterSet::new().with("variable", "u"),
            )
            .unwrap();
        assert!(created.descriptor.capabilities().contains(Capability::Stateful));
        let m = material(created.handle);
        let h = bench.properties.id("history").unwrap();
        assert!(bench.properties.is_stateful(h));
        // Reading its own old value is legal once declared stateful.
        assert!(bench.properties.resolve().is_ok());

        bench.set("u", &[2.0, 2.0]);
        let mut ctx = bench.context(0, 1.0);
        ctx.run_material(m.as_ref(), Some(u), true);
        assert_eq!(ctx.data.props.get(h, State::Old, 0), 0.0);
        ctx.data.props.load(h, State::Old, &[1.0, 1.0]);
        ctx.run_material(m.as_ref(), Some(u), false);
        assert_eq!(ctx.data.props.get(h, State::Current, 0), 3.0);
        assert_eq!(ctx.data.props.get(h, State::Current, 1), 3.0);
    }
}
