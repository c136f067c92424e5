// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Authorization checks for mode changes and failsafe actions.

use std::collections::HashMap;

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

use crate::process::state::{ProjectPhase, RequestedMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    View,
    SetMode,
    EnableAuto,
    ClearFailsafe,
    TriggerFailsafe,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::View,
        Permission::SetMode,
        Permission::EnableAuto,
        Permission::ClearFailsafe,
        Permission::TriggerFailsafe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::SetMode => "set_mode",
            Permission::EnableAuto => "enable_auto",
            Permission::ClearFailsafe => "clear_failsafe",
            Permission::TriggerFailsafe => "trigger_failsafe",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of permissions held by a role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet(u8);

impl PermissionSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self::from_iter(Permission::ALL)
    }

    pub fn contains(&self, p: Permission) -> bool {
        self.0 & p.bit() != 0
    }

    pub fn insert(&mut self, p: Permission) {
        self.0 |= p.bit();
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL.into_iter().filter(|p| self.contains(*p))
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = Self::empty();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for p in self.iter() {
            seq.serialize_element(&p)?;
        }
        seq.end()
    }
}

/// Role name to permission set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    roles: HashMap<String, PermissionSet>,
}

impl Default for RoleTable {
    fn default() -> Self {
        use Permission::*;
        let mut roles = HashMap::new();
        roles.insert("viewer".to_string(), PermissionSet::from_iter([View]));
        roles.insert(
            "operator".to_string(),
            PermissionSet::from_iter([View, SetMode, TriggerFailsafe]),
        );
        roles.insert(
            "engineer".to_string(),
            PermissionSet::from_iter([View, SetMode, EnableAuto, TriggerFailsafe]),
        );
        roles.insert("supervisor".to_string(), PermissionSet::all());
        Self { roles }
    }
}

impl RoleTable {
    pub fn empty() -> Self {
        Self {
            roles: HashMap::new(),
        }
    }

    /// Add or replace a role.
    pub fn insert(&mut self, role: impl Into<String>, permissions: PermissionSet) {
        self.roles.insert(role.into(), permissions);
    }

    pub fn permissions(&self, role: &str) -> Option<PermissionSet> {
        self.roles.get(role).copied()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum GateDecision {
    Allowed,
    Denied(String),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }

    fn denied(reason: impl Into<String>) -> Self {
        GateDecision::Denied(reason.into())
    }
}

/// Closed-loop control needs the phase, the permission, and no latched failsafe.
pub fn can_enable_auto(
    permissions: PermissionSet,
    phase: ProjectPhase,
    failsafe_active: bool,
) -> GateDecision {
    if phase != ProjectPhase::ClosedLoop {
        return GateDecision::denied("auto mode requires the closed_loop phase");
    }
    if !permissions.contains(Permission::EnableAuto) {
        return GateDecision::denied("missing permission enable_auto");
    }
    if failsafe_active {
        return GateDecision::denied("failsafe is active");
    }
    GateDecision::Allowed
}

pub fn can_request_mode(
    permissions: PermissionSet,
    phase: ProjectPhase,
    mode: RequestedMode,
    failsafe_active: bool,
) -> GateDecision {
    if !permissions.contains(Permission::SetMode) {
        return GateDecision::denied("missing permission set_mode");
    }
    if mode == RequestedMode::Auto {
        return can_enable_auto(permissions, phase, failsafe_active);
    }
    if !phase.permits(mode) {
        return GateDecision::denied(format!(
            "mode {} not permitted in phase {:?}",
            crate::process::state::ControlMode::from(mode),
            phase
        ));
    }
    if failsafe_active {
        return GateDecision::denied("failsafe is active, clear it first");
    }
    GateDecision::Allowed
}

pub fn can_clear_failsafe(permissions: PermissionSet, failsafe_active: bool) -> GateDecision {
    if !permissions.contains(Permission::ClearFailsafe) {
        return GateDecision::denied("missing permission clear_failsafe");
    }
    if !failsafe_active {
        return GateDecision::denied("failsafe is not active");
    }
    GateDecision::Allowed
}

pub fn can_trigger_failsafe(permissions: PermissionSet) -> GateDecision {
    if permissions.contains(Permission::TriggerFailsafe) {
        GateDecision::Allowed
    } else {
        GateDecision::denied("missing permission trigger_failsafe")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_auto_requires_everything() {
        let eng = RoleTable::default().permissions("engineer").unwrap();
        assert!(can_enable_auto(eng, ProjectPhase::ClosedLoop, false).is_allowed());
        assert!(!can_enable_auto(eng, ProjectPhase::Advisory, false).is_allowed());
        assert!(!can_enable_auto(eng, ProjectPhase::ClosedLoop, true).is_allowed());

        let op = RoleTable::default().permissions("operator").unwrap();
        assert_eq!(
            can_enable_auto(op, ProjectPhase::ClosedLoop, false),
            GateDecision::Denied("missing permission enable_auto".to_string())
        );
    }

    #[test]
    fn test_request_mode_respects_phase() {
        let op = RoleTable::default().permissions("operator").unwrap();
        assert!(can_request_mode(op, ProjectPhase::ReadOnly, RequestedMode::Manual, false)
            .is_allowed());
        assert!(
            !can_request_mode(op, ProjectPhase::ReadOnly, RequestedMode::Advisory, false)
                .is_allowed()
        );
        assert!(
            can_request_mode(op, ProjectPhase::Advisory, RequestedMode::Advisory, false)
                .is_allowed()
        );
        assert!(
            !can_request_mode(op, ProjectPhase::Advisory, RequestedMode::Manual, true).is_allowed()
        );

        let viewer = RoleTable::default().permissions("viewer").unwrap();
        assert!(
            !can_request_mode(viewer, ProjectPhase::ClosedLoop, RequestedMode::Manual, false)
                .is_allowed()
        );
    }

    #[test]
    fn test_clear_failsafe_needs_supervisor() {
        let table = RoleTable::default();
        let sup = table.permissions("supervisor").unwrap();
        let eng = table.permissions("engineer").unwrap();
        assert!(can_clear_failsafe(sup, true).is_allowed());
        assert!(!can_clear_failsafe(eng, true).is_allowed());
        assert!(!can_clear_failsafe(sup, false).is_allowed());
    }

    #[test]
    fn test_trigger_failsafe() {
        let table = RoleTable::default();
        assert!(can_trigger_failsafe(table.permissions("operator").unwrap()).is_allowed());
        assert!(!can_trigger_failsafe(table.permissions("viewer").unwrap()).is_allowed());
    }

    #[test]
    fn test_permission_set_serializes_as_names() {
        let set = PermissionSet::from_iter([Permission::View, Permission::ClearFailsafe]);
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"["view","clear_failsafe"]"#
        );
        assert!(PermissionSet::empty().iter().next().is_none());
    }
}
