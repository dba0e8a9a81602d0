//! Role definitions: named bundles of permissions with a parameter mapping.

use std::collections::{BTreeMap, BTreeSet};

use common::AggregateId;
use serde::{Deserialize, Serialize};

use super::{OrganizationError, PermissionDefinition, RoleDefinitionId};

/// A locally scoped role parameter and the permission parameters it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamMapping {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Qualified permission parameter ids (`scope:name:paramId`).
    pub mapping: Vec<String>,
}

impl ParamMapping {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
        mapping: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
            mapping: mapping.into_iter().map(Into::into).collect(),
        }
    }
}

/// Entry of the reverse mapping: which local parameter feeds a permission parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseParam {
    pub local: String,
    pub required: bool,
}

/// The descriptive part of a role definition, shared by creation and change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDefinitionContent {
    pub name: String,
    pub description: String,
    pub param_mapping: BTreeMap<String, ParamMapping>,
    pub permissions: Vec<PermissionDefinition>,
}

impl RoleDefinitionContent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, local: impl Into<String>, mapping: ParamMapping) -> Self {
        self.param_mapping.insert(local.into(), mapping);
        self
    }

    pub fn permission(mut self, permission: PermissionDefinition) -> Self {
        self.permissions.push(permission);
        self
    }
}

/// Input for creating a role definition.
///
/// Exactly one of `org_id` (organization-scoped definition, a fresh id is
/// generated) or `role_def_id` (template owned by the `default`
/// pseudo-organization) must be supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoleDefinition {
    pub org_id: Option<AggregateId>,
    pub role_def_id: Option<RoleDefinitionId>,
    pub content: RoleDefinitionContent,
}

impl NewRoleDefinition {
    /// An organization-scoped definition.
    pub fn for_organization(org_id: AggregateId, content: RoleDefinitionContent) -> Self {
        Self {
            org_id: Some(org_id),
            role_def_id: None,
            content,
        }
    }

    /// A template definition with a caller-supplied id.
    pub fn template(role_def_id: RoleDefinitionId, content: RoleDefinitionContent) -> Self {
        Self {
            org_id: None,
            role_def_id: Some(role_def_id),
            content,
        }
    }
}

/// A validated role definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    role_def_id: RoleDefinitionId,
    org_id: AggregateId,
    name: String,
    description: String,
    param_mapping: BTreeMap<String, ParamMapping>,
    permissions: Vec<PermissionDefinition>,
}

impl RoleDefinition {
    /// Validates the input and builds a definition.
    pub fn new(input: NewRoleDefinition) -> Result<Self, OrganizationError> {
        let (role_def_id, org_id) = match (input.org_id, input.role_def_id) {
            (Some(org_id), None) => {
                if org_id.is_blank() {
                    return Err(OrganizationError::validation("orgId must not be empty"));
                }
                (RoleDefinitionId::generate(), org_id)
            }
            (None, Some(role_def_id)) => {
                if role_def_id.is_blank() {
                    return Err(OrganizationError::validation(
                        "roleDefId must not be empty",
                    ));
                }
                (role_def_id, AggregateId::default_organization())
            }
            _ => {
                return Err(OrganizationError::validation(
                    "exactly one of orgId or roleDefId must be supplied",
                ));
            }
        };

        Self::build(role_def_id, org_id, input.content)
    }

    /// Returns a copy with new content, keeping the identity.
    pub fn revise(&self, content: RoleDefinitionContent) -> Result<Self, OrganizationError> {
        Self::build(self.role_def_id.clone(), self.org_id.clone(), content)
    }

    fn build(
        role_def_id: RoleDefinitionId,
        org_id: AggregateId,
        content: RoleDefinitionContent,
    ) -> Result<Self, OrganizationError> {
        if content.name.trim().is_empty() {
            return Err(OrganizationError::validation(
                "role definition name must not be empty",
            ));
        }

        let definition = Self {
            role_def_id,
            org_id,
            name: content.name,
            description: content.description,
            param_mapping: content.param_mapping,
            permissions: content.permissions,
        };
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> Result<(), OrganizationError> {
        let mut seen = BTreeSet::new();
        for permission in &self.permissions {
            if !seen.insert(permission.key()) {
                return Err(OrganizationError::validation(format!(
                    "permission {}:{} is listed more than once",
                    permission.scope(),
                    permission.name()
                )));
            }
        }

        let declared: BTreeSet<&str> = self
            .permissions
            .iter()
            .flat_map(|p| p.parameters().keys().map(String::as_str))
            .collect();

        let mut targets = BTreeSet::new();
        for (local, param) in &self.param_mapping {
            if param.mapping.is_empty() {
                return Err(OrganizationError::validation(format!(
                    "parameter {local} does not map to any permission parameter"
                )));
            }
            for target in &param.mapping {
                if !declared.contains(target.as_str()) {
                    return Err(OrganizationError::validation(format!(
                        "parameter {local} maps to unknown permission parameter {target}"
                    )));
                }
                if !targets.insert(target.as_str()) {
                    return Err(OrganizationError::validation(format!(
                        "permission parameter {target} is mapped more than once"
                    )));
                }
            }
        }

        let reverse = self.reverse_mapping();
        for permission in &self.permissions {
            for required in permission.required_parameters() {
                match reverse.get(required) {
                    Some(entry) if entry.required => {}
                    Some(entry) => {
                        return Err(OrganizationError::validation(format!(
                            "parameter {} must be required because it feeds required permission parameter {required}",
                            entry.local
                        )));
                    }
                    None => {
                        return Err(OrganizationError::validation(format!(
                            "required permission parameter {required} is not mapped"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn id(&self) -> &RoleDefinitionId {
        &self.role_def_id
    }

    /// The organization that owns this definition (`default` for templates).
    pub fn org_id(&self) -> &AggregateId {
        &self.org_id
    }

    pub fn is_template(&self) -> bool {
        self.org_id.as_str() == AggregateId::DEFAULT_ORGANIZATION
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn param_mapping(&self) -> &BTreeMap<String, ParamMapping> {
        &self.param_mapping
    }

    pub fn permissions(&self) -> &[PermissionDefinition] {
        &self.permissions
    }

    /// Maps each qualified permission parameter back to the local parameter feeding it.
    pub fn reverse_mapping(&self) -> BTreeMap<String, ReverseParam> {
        self.param_mapping
            .iter()
            .flat_map(|(local, param)| {
                param.mapping.iter().map(move |target| {
                    (
                        target.clone(),
                        ReverseParam {
                            local: local.clone(),
                            required: param.required,
                        },
                    )
                })
            })
            .collect()
    }

    /// Local parameter names that must be supplied when binding this role.
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.param_mapping
            .iter()
            .filter(|(_, param)| param.required)
            .map(|(local, _)| local.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organization::ParameterSpec;

    fn take_orders() -> PermissionDefinition {
        PermissionDefinition::new(
            "orders",
            "take",
            "Take orders",
            [
                (
                    "locationId".to_string(),
                    ParameterSpec::required("Location", ""),
                ),
                ("tableId".to_string(), ParameterSpec::optional("Table", "")),
            ],
        )
        .unwrap()
    }

    fn waiter_content() -> RoleDefinitionContent {
        RoleDefinitionContent::new("Waiter")
            .description("Serves tables")
            .param(
                "location",
                ParamMapping::new("Location", "", true, ["orders:take:locationId"]),
            )
            .param(
                "table",
                ParamMapping::new("Table", "", false, ["orders:take:tableId"]),
            )
            .permission(take_orders())
    }

    #[test]
    fn organization_scoped_definition_gets_fresh_id() {
        let org_id = AggregateId::from("risto");
        let a = RoleDefinition::new(NewRoleDefinition::for_organization(
            org_id.clone(),
            waiter_content(),
        ))
        .unwrap();
        let b = RoleDefinition::new(NewRoleDefinition::for_organization(
            org_id.clone(),
            waiter_content(),
        ))
        .unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(a.org_id(), &org_id);
        assert!(!a.is_template());
    }

    #[test]
    fn template_keeps_supplied_id_and_default_org() {
        let definition = RoleDefinition::new(NewRoleDefinition::template(
            RoleDefinitionId::from("waiter"),
            waiter_content(),
        ))
        .unwrap();

        assert_eq!(definition.id().as_str(), "waiter");
        assert_eq!(definition.org_id().as_str(), "default");
        assert!(definition.is_template());
    }

    #[test]
    fn both_or_neither_identity_is_rejected() {
        let both = NewRoleDefinition {
            org_id: Some(AggregateId::from("risto")),
            role_def_id: Some(RoleDefinitionId::from("waiter")),
            content: waiter_content(),
        };
        assert!(matches!(
            RoleDefinition::new(both),
            Err(OrganizationError::Validation(_))
        ));

        let neither = NewRoleDefinition {
            org_id: None,
            role_def_id: None,
            content: waiter_content(),
        };
        assert!(matches!(
            RoleDefinition::new(neither),
            Err(OrganizationError::Validation(_))
        ));
    }

    #[test]
    fn required_permission_parameter_must_be_mapped() {
        let content = RoleDefinitionContent::new("Waiter")
            .param(
                "table",
                ParamMapping::new("Table", "", false, ["orders:take:tableId"]),
            )
            .permission(take_orders());

        let err = RoleDefinition::new(NewRoleDefinition::template("waiter".into(), content))
            .unwrap_err();
        match err {
            OrganizationError::Validation(msg) => assert!(msg.contains("locationId")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn required_permission_parameter_must_be_required_locally() {
        let content = RoleDefinitionContent::new("Waiter")
            .param(
                "location",
                ParamMapping::new("Location", "", false, ["orders:take:locationId"]),
            )
            .permission(take_orders());

        assert!(matches!(
            RoleDefinition::new(NewRoleDefinition::template("waiter".into(), content)),
            Err(OrganizationError::Validation(_))
        ));
    }

    #[test]
    fn mapping_to_undeclared_parameter_is_rejected() {
        let content = waiter_content().param(
            "menu",
            ParamMapping::new("Menu", "", false, ["menu:edit:menuId"]),
        );

        assert!(matches!(
            RoleDefinition::new(NewRoleDefinition::template("waiter".into(), content)),
            Err(OrganizationError::Validation(_))
        ));
    }

    #[test]
    fn blank_name_is_rejected() {
        let content = RoleDefinitionContent {
            name: "  ".to_string(),
            ..waiter_content()
        };
        assert!(matches!(
            RoleDefinition::new(NewRoleDefinition::template("waiter".into(), content)),
            Err(OrganizationError::Validation(_))
        ));
    }

    #[test]
    fn reverse_mapping_points_back_to_local_names() {
        let definition =
            RoleDefinition::new(NewRoleDefinition::template("waiter".into(), waiter_content()))
                .unwrap();
        let reverse = definition.reverse_mapping();

        assert_eq!(
            reverse.get("orders:take:locationId"),
            Some(&ReverseParam {
                local: "location".to_string(),
                required: true
            })
        );
        assert_eq!(reverse.get("orders:take:tableId").unwrap().local, "table");
        assert_eq!(definition.required_params().collect::<Vec<_>>(), vec!["location"]);
    }

    #[test]
    fn revise_keeps_identity() {
        let definition =
            RoleDefinition::new(NewRoleDefinition::template("waiter".into(), waiter_content()))
                .unwrap();
        let revised = definition
            .revise(waiter_content().description("Head waiter"))
            .unwrap();

        assert_eq!(revised.id(), definition.id());
        assert_eq!(revised.org_id(), definition.org_id());
        assert_eq!(revised.description(), "Head waiter");
    }
}
