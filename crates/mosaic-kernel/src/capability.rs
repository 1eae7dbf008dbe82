//! Capability sets declared by registered types.

use std::fmt;

/// One capability a contributor or material may provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Capability {
    /// Contributes to residual vectors.
    Residual = 0,
    /// Contributes to Jacobian matrices with hand-coded derivatives.
    Jacobian = 1,
    /// Declares stateful (old/older) material properties.
    Stateful = 2,
    /// Derivatives come from automatic differentiation.
    Ad = 3,
}

impl Capability {
    const ALL: [Capability; 4] = [Self::Residual, Self::Jacobian, Self::Stateful, Self::Ad];

    fn name(self) -> &'static str {
        match self {
            Self::Residual => "Residual",
            Self::Jacobian => "Jacobian",
            Self::Stateful => "Stateful",
            Self::Ad => "AD",
        }
    }
}

/// A small set of [`Capability`] flags.
///
/// The assembly loop queries capabilities instead of type identity: a
/// contributor without [`Capability::Jacobian`] or [`Capability::Ad`]
/// contributes nothing to matrices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// No capabilities.
    pub const EMPTY: CapabilitySet = CapabilitySet(0);
    /// Residual only.
    pub const RESIDUAL: CapabilitySet = CapabilitySet(1 << Capability::Residual as u8);
    /// Residual with hand-coded Jacobian.
    pub const RESIDUAL_JACOBIAN: CapabilitySet =
        CapabilitySet(1 << Capability::Residual as u8 | 1 << Capability::Jacobian as u8);
    /// Residual with AD-derived Jacobian.
    pub const AD: CapabilitySet =
        CapabilitySet(1 << Capability::Residual as u8 | 1 << Capability::Ad as u8);

    /// Build a set from individual flags.
    pub fn of(caps: &[Capability]) -> Self {
        caps.iter().fold(Self::EMPTY, |s, &c| s.with(c))
    }

    /// This set plus `cap`.
    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | 1 << cap as u8)
    }

    /// Returns `true` if `cap` is present.
    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & (1 << cap as u8) != 0
    }

    /// Returns `true` if this set yields Jacobian entries, by hand or by AD.
    pub const fn provides_jacobian(self) -> bool {
        self.contains(Capability::Jacobian) || self.contains(Capability::Ad)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for cap in Capability::ALL {
            if self.contains(cap) {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(cap.name())?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_and_display() {
        assert!(CapabilitySet::RESIDUAL.contains(Capability::Residual));
        assert!(!CapabilitySet::RESIDUAL.provides_jacobian());
        assert!(CapabilitySet::RESIDUAL_JACOBIAN.provides_jacobian());
        assert!(CapabilitySet::AD.provides_jacobian());
        assert_eq!(CapabilitySet::AD.to_string(), "Residual+AD");
        assert_eq!(CapabilitySet::EMPTY.to_string(), "none");
        let s = CapabilitySet::of(&[Capability::Residual, Capability::Stateful]);
        assert!(s.contains(Capability::Stateful));
        assert!(!s.contains(Capability::Jacobian));
    }
}
