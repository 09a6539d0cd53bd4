use std::collections::HashSet;

use agenttrace_core::error::{CoreError, Result};

/// The three C6 capabilities (spec.md §4.6 "Permissions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    AuditRead,
    AuditExport,
    AuditAdmin,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::AuditRead => "audit:read",
            Capability::AuditExport => "audit:export",
            Capability::AuditAdmin => "audit:admin",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionSet(HashSet<Capability>);

impl PermissionSet {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self(capabilities.into_iter().collect())
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.0.contains(&Capability::AuditAdmin) || self.0.contains(&capability)
    }

    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!("missing required capability '{}'", capability.as_str())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_capability_implies_every_other_capability() {
        let perms = PermissionSet::new([Capability::AuditAdmin]);
        assert!(perms.require(Capability::AuditRead).is_ok());
        assert!(perms.require(Capability::AuditExport).is_ok());
    }

    #[test]
    fn missing_capability_is_rejected() {
        let perms = PermissionSet::new([Capability::AuditRead]);
        assert!(perms.require(Capability::AuditExport).is_err());
    }
}
