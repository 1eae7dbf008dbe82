//! The type registry and the `create` path.

use indexmap::IndexMap;
use mosaic_core::{ParameterSet, SetupError, Subsystem};
use mosaic_kernel::{
    BuildContext, Capability, Couplings, PropertyRegistry, Restriction, VariableTable,
};
use mosaic_mesh::Mesh;

use crate::common::common_params;
use crate::descriptor::{ObjectHandle, TypeDescriptor, Variant};

/// Prefix selecting the AD variant of a type registered with
/// [`Registry::register_variants`].
pub const AD_PREFIX: &str = "AD";

#[derive(Clone, Debug)]
struct Rename {
    target: String,
    note: String,
}

/// An object built by [`Registry::create`], with everything needed to
/// rebuild it on another thread.
#[derive(Debug)]
pub struct Created {
    /// The object.
    pub handle: ObjectHandle,
    /// Validated parameters. Per-thread rebuilds must use this very set so
    /// every instance shares its controllable cells.
    pub params: ParameterSet,
    /// Resolved block/boundary restriction.
    pub restriction: Restriction,
    /// Couplings recorded by the constructor.
    pub couplings: Couplings,
    /// The descriptor the object was built from.
    pub descriptor: TypeDescriptor,
}

/// Maps type ids to descriptors.
///
/// Populated at process start and read-only afterwards; a problem holds it
/// behind an `Arc`.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    types: IndexMap<String, TypeDescriptor>,
    renamed: IndexMap<String, Rename>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_free(&self, type_id: &str) -> Result<(), SetupError> {
        if self.types.contains_key(type_id) || self.renamed.contains_key(type_id) {
            return Err(SetupError::DuplicateType {
                type_id: type_id.to_string(),
            });
        }
        Ok(())
    }

    /// Register a type under `type_id`.
    pub fn register(&mut self, type_id: &str, desc: TypeDescriptor) -> Result<(), SetupError> {
        self.check_free(type_id)?;
        self.types.insert(
            type_id.to_string(),
            desc.with_identity(type_id, Variant::Manual),
        );
        Ok(())
    }

    /// Register `base` (manual) and `AD<base>` (AD) together.
    pub fn register_variants(
        &mut self,
        base: &str,
        manual: TypeDescriptor,
        ad: TypeDescriptor,
    ) -> Result<(), SetupError> {
        let ad_id = format!("{AD_PREFIX}{base}");
        if !ad.capabilities().contains(Capability::Ad) {
            return Err(SetupError::InvalidState {
                reason: format!("'{ad_id}' is registered as AD without the AD capability"),
            });
        }
        self.check_free(base)?;
        self.check_free(&ad_id)?;
        self.types
            .insert(base.to_string(), manual.with_identity(base, Variant::Manual));
        self.types
            .insert(ad_id.clone(), ad.with_identity(&ad_id, Variant::Ad));
        Ok(())
    }

    /// Keep a retired type id working: lookups of `old` warn and forward
    /// to `new`.
    pub fn register_renamed(&mut self, old: &str, new: &str, note: &str) -> Result<(), SetupError> {
        self.check_free(old)?;
        self.renamed.insert(
            old.to_string(),
            Rename {
                target: new.to_string(),
                note: note.to_string(),
            },
        );
        Ok(())
    }

    /// The descriptor for `type_id`, following renames.
    pub fn descriptor(&self, type_id: &str) -> Option<&TypeDescriptor> {
        let mut id = type_id;
        // A rename chain can be at most as long as the rename table.
        for _ in 0..=self.renamed.len() {
            if let Some(desc) = self.types.get(id) {
                return Some(desc);
            }
            let rename = self.renamed.get(id)?;
            log::warn!(
                "type '{id}' is deprecated, use '{}' instead: {}",
                rename.target,
                rename.note
            );
            id = &rename.target;
        }
        None
    }

    /// Returns `true` if `type_id` is registered (directly or renamed).
    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id) || self.renamed.contains_key(type_id)
    }

    /// Number of registered types, renames excluded.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Type ids in registration order.
    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Descriptors of one subsystem, in registration order.
    pub fn types_in(&self, subsystem: Subsystem) -> impl Iterator<Item = &TypeDescriptor> {
        self.types
            .values()
            .filter(move |d| d.subsystem() == subsystem)
    }

    /// Full schema of a type: common parameters, then the type's own.
    pub fn schema(&self, type_id: &str) -> Option<ParameterSet> {
        self.descriptor(type_id).map(|d| {
            let mut p = common_params(d.subsystem());
            p.merge(&d.own_schema());
            p
        })
    }

    /// Look up, merge, and validate without constructing.
    pub fn prepare(
        &self,
        subsystem: Subsystem,
        type_id: &str,
        name: &str,
        user: &ParameterSet,
    ) -> Result<(&TypeDescriptor, ParameterSet), SetupError> {
        let desc = self
            .descriptor(type_id)
            .ok_or_else(|| SetupError::UnknownType {
                subsystem,
                type_id: type_id.to_string(),
            })?;
        if desc.subsystem() != subsystem {
            return Err(SetupError::SubsystemMismatch {
                type_id: type_id.to_string(),
                requested: subsystem,
                registered: desc.subsystem(),
            });
        }
        let mut params = common_params(subsystem);
        params.merge(&desc.own_schema());
        params.merge(user);
        params
            .validate()
            .map_err(|issues| SetupError::ParameterValidation {
                object: name.to_string(),
                type_id: desc.type_id().to_string(),
                issues,
            })?;
        Ok((desc, params))
    }

    /// Build one object.
    ///
    /// Validates `user` against the type's schema, resolves the object's
    /// restriction on `mesh`, and runs the constructor, which records its
    /// couplings against `variables` and `properties`.
    pub fn create(
        &self,
        subsystem: Subsystem,
        type_id: &str,
        name: &str,
        user: &ParameterSet,
        mesh: &dyn Mesh,
        variables: &VariableTable,
        properties: &mut PropertyRegistry,
    ) -> Result<Created, SetupError> {
        let (desc, params) = self.prepare(subsystem, type_id, name, user)?;
        let primary = params.get_opt::<String>("variable").ok().flatten();
        let restriction = Restriction::resolve(name, &params, mesh, variables, primary.as_deref())?;
        let mut ctx = BuildContext::new(
            name,
            subsystem,
            &params,
            &restriction,
            variables,
            properties,
        )
        .with_capabilities(desc.capabilities());
        let handle = desc.construct(&mut ctx)?;
        let couplings = ctx.finish();
        Ok(Created {
            handle,
            params,
            restriction,
            couplings,
            descriptor: desc.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{ParamIssue, ParamType, ProgrammerError};
    use mosaic_kernel::{
        AdAdapter, AdContributor, CapabilitySet, Contributor, Dual, DualQp, Material,
        PropertyWriter, QpView, VariableKind,
    };
    use mosaic_mesh::EdgeMesh;
    use std::collections::BTreeSet;

    struct Scaled(f64);

    impl Contributor for Scaled {
        fn residual(&self, qp: &QpView<'_>, test: usize) -> f64 {
            self.0 * qp.u() * qp.phi(test)
        }
    }

    struct AdScaled(f64);

    impl AdContributor for AdScaled {
        fn residual(&self, qp: &DualQp<'_, '_>, test: usize) -> Dual {
            qp.u() * self.0 * qp.phi(test)
        }
    }

    fn schema() -> ParameterSet {
        let mut p = ParameterSet::new();
        p.add_param("coeff", 1.0, "Scale factor")
            .add_required_param("label", ParamType::Str, "Required for the test");
        p
    }

    fn scaled() -> TypeDescriptor {
        TypeDescriptor::new(Subsystem::Kernels, CapabilitySet::RESIDUAL, schema, |ctx| {
            ctx.primary_variable()?;
            Ok(ObjectHandle::Kernel(Box::new(Scaled(ctx.param("coeff")?))))
        })
    }

    fn ad_scaled() -> TypeDescriptor {
        TypeDescriptor::new(Subsystem::Kernels, CapabilitySet::AD, schema, |ctx| {
            ctx.primary_variable()?;
            Ok(ObjectHandle::Kernel(Box::new(AdAdapter(AdScaled(
                ctx.param("coeff")?,
            )))))
        })
    }

    struct Env {
        mesh: EdgeMesh,
        vars: VariableTable,
        props: PropertyRegistry,
    }

    fn env() -> Env {
        let mesh = EdgeMesh::new(0.0, 1.0, 2).unwrap();
        let mut vars = VariableTable::new();
        vars.add("u", VariableKind::Nonlinear, BTreeSet::from([mosaic_core::BlockId(0)]))
            .unwrap();
        Env {
            mesh,
            vars,
            props: PropertyRegistry::new(),
        }
    }

    fn create(
        reg: &Registry,
        env: &mut Env,
        type_id: &str,
        user: &ParameterSet,
    ) -> Result<Created, SetupError> {
        reg.create(
            Subsystem::Kernels,
            type_id,
            "k",
            user,
            &env.mesh,
            &env.vars,
            &mut env.props,
        )
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut reg = Registry::new();
        reg.register("Scaled", scaled()).unwrap();
        match reg.register("Scaled", scaled()) {
            Err(SetupError::DuplicateType { type_id }) => assert_eq!(type_id, "Scaled"),
            other => panic!("expected DuplicateType, got {other:?}"),
        }
        reg.register_renamed("OldScaled", "Scaled", "renamed").unwrap();
        assert!(reg.register("OldScaled", scaled()).is_err());
    }

    #[test]
    fn create_with_defaults_and_overrides() {
        let mut reg = Registry::new();
        reg.register("Scaled", scaled()).unwrap();
        let mut env = env();
        let user = ParameterSet::new()
            .with("variable", "u")
            .with("label", "x")
            .with("coeff", 2.0);
        let c = create(&reg, &mut env, "Scaled", &user).unwrap();
        assert_eq!(c.params.get::<f64>("coeff").unwrap(), 2.0);
        assert_eq!(c.couplings.primary, Some(mosaic_core::VariableId(0)));
        assert_eq!(c.restriction.blocks.len(), 1);
        assert_eq!(c.descriptor.type_id(), "Scaled");

        let user = ParameterSet::new().with("variable", "u").with("label", "x");
        let c = create(&reg, &mut env, "Scaled", &user).unwrap();
        assert_eq!(c.params.get::<f64>("coeff").unwrap(), 1.0);
    }

    #[test]
    fn missing_required_parameter_is_itemized() {
        let mut reg = Registry::new();
        reg.register("Scaled", scaled()).unwrap();
        let mut env = env();
        let user = ParameterSet::new().with("coeff", 2.0).with("cooef", 3.0);
        match create(&reg, &mut env, "Scaled", &user) {
            Err(SetupError::ParameterValidation {
                object,
                type_id,
                issues,
            }) => {
                assert_eq!(object, "k");
                assert_eq!(type_id, "Scaled");
                assert!(issues.contains(&ParamIssue::Missing {
                    name: "variable".into()
                }));
                assert!(issues.contains(&ParamIssue::Missing {
                    name: "label".into()
                }));
                assert!(issues.contains(&ParamIssue::Unknown {
                    name: "cooef".into()
                }));
            }
            other => panic!("expected ParameterValidation, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_and_wrong_subsystem() {
        let mut reg = Registry::new();
        reg.register("Scaled", scaled()).unwrap();
        let mut env = env();
        match create(&reg, &mut env, "Nope", &ParameterSet::new()) {
            Err(SetupError::UnknownType { subsystem, type_id }) => {
                assert_eq!(subsystem, Subsystem::Kernels);
                assert_eq!(type_id, "Nope");
            }
            other => panic!("expected UnknownType, got {other:?}"),
        }
        let err = reg
            .prepare(Subsystem::Materials, "Scaled", "m", &ParameterSet::new())
            .unwrap_err();
        assert!(matches!(err, SetupError::SubsystemMismatch { .. }));
    }

    #[test]
    fn renamed_type_forwards() {
        let mut reg = Registry::new();
        reg.register("Scaled", scaled()).unwrap();
        reg.register_renamed("Legacy", "Scaled", "use Scaled").unwrap();
        let mut env = env();
        let user = ParameterSet::new().with("variable", "u").with("label", "x");
        let c = create(&reg, &mut env, "Legacy", &user).unwrap();
        assert_eq!(c.descriptor.type_id(), "Scaled");
        assert!(reg.contains("Legacy"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn variants_selected_by_prefix() {
        let mut reg = Registry::new();
        reg.register_variants("Scaled", scaled(), ad_scaled()).unwrap();
        assert_eq!(reg.descriptor("Scaled").unwrap().variant(), Variant::Manual);
        let ad = reg.descriptor("ADScaled").unwrap();
        assert_eq!(ad.variant(), Variant::Ad);
        assert!(ad.capabilities().provides_jacobian());
        assert_eq!(reg.types_in(Subsystem::Kernels).count(), 2);
        assert!(reg.register_variants("Scaled", scaled(), ad_scaled()).is_err());
    }

    #[test]
    fn handle_must_fit_subsystem() {
        let mut reg = Registry::new();
        let wrong = TypeDescriptor::new(
            Subsystem::Materials,
            CapabilitySet::EMPTY,
            ParameterSet::new,
            |_| Ok(ObjectHandle::Kernel(Box::new(Scaled(1.0)))),
        );
        reg.register("Wrong", wrong).unwrap();
        let mut env = env();
        let err = reg
            .create(
                Subsystem::Materials,
                "Wrong",
                "m",
                &ParameterSet::new(),
                &env.mesh,
                &env.vars,
                &mut env.props,
            )
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidState { .. }));
    }

    struct Keeps;

    impl Material for Keeps {
        fn compute_qp_properties(&self, _qp: &QpView<'_>, _out: &mut PropertyWriter) {}
    }

    fn keeps(capabilities: CapabilitySet) -> TypeDescriptor {
        TypeDescriptor::new(Subsystem::Materials, capabilities, ParameterSet::new, |ctx| {
            ctx.declare_stateful_property("s")?;
            Ok(ObjectHandle::Material(Box::new(Keeps)))
        })
    }

    #[test]
    fn stateful_declaration_needs_the_capability() {
        let mut reg = Registry::new();
        reg.register("Keeps", keeps(CapabilitySet::RESIDUAL)).unwrap();
        reg.register("StatefulKeeps", keeps(CapabilitySet::of(&[Capability::Stateful])))
            .unwrap();
        let mut env = env();
        let build = |type_id: &str, env: &mut Env| {
            reg.create(
                Subsystem::Materials,
                type_id,
                "m",
                &ParameterSet::new(),
                &env.mesh,
                &env.vars,
                &mut env.props,
            )
        };
        match build("Keeps", &mut env) {
            Err(SetupError::Programmer(ProgrammerError::UndeclaredCapability {
                object,
                capability,
            })) => {
                assert_eq!(object, "m");
                assert_eq!(capability, "Stateful");
            }
            other => panic!("expected UndeclaredCapability, got {other:?}"),
        }
        assert!(env.props.is_empty());
        let created = build("StatefulKeeps", &mut env).unwrap();
        assert_eq!(created.couplings.declared.len(), 1);
        assert!(env.props.id("s").is_some_and(|id| env.props.is_stateful(id)));
    }

    #[test]
    fn ad_variant_must_declare_ad() {
        let mut reg = Registry::new();
        match reg.register_variants("Scaled", scaled(), scaled()) {
            Err(SetupError::InvalidState { reason }) => assert!(reason.contains("ADScaled")),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert!(reg.is_empty());
    }
}
