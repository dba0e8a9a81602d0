//! Role instances: role definitions bound to concrete parameter values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{OrganizationError, Permission, RoleDefinition, RoleDefinitionId, RoleInstanceId};

/// Request to bind a role definition to a user with the given values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role_def_id: RoleDefinitionId,
    /// Values keyed by the definition's local parameter names.
    pub values: BTreeMap<String, String>,
}

impl RoleAssignment {
    pub fn new(role_def_id: impl Into<RoleDefinitionId>) -> Self {
        Self {
            role_def_id: role_def_id.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn value(mut self, param: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(param.into(), value.into());
        self
    }
}

/// A role definition bound to a set of parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInstance {
    role_instance_id: RoleInstanceId,
    role_def_id: RoleDefinitionId,
    values: BTreeMap<String, String>,
}

impl RoleInstance {
    /// Binds `definition` to `values`.
    ///
    /// Every required local parameter must be present and every supplied
    /// value must belong to a declared parameter.
    pub fn new(
        definition: &RoleDefinition,
        values: BTreeMap<String, String>,
    ) -> Result<Self, OrganizationError> {
        for required in definition.required_params() {
            if !values.contains_key(required) {
                return Err(OrganizationError::validation(format!(
                    "role {} requires parameter {required}",
                    definition.id()
                )));
            }
        }

        if let Some(unknown) = values
            .keys()
            .find(|name| !definition.param_mapping().contains_key(name.as_str()))
        {
            return Err(OrganizationError::validation(format!(
                "role {} has no parameter {unknown}",
                definition.id()
            )));
        }

        let canonical = values.iter().fold(
            definition.id().as_str().to_string(),
            |mut acc, (name, value)| {
                acc.push('\u{1f}');
                acc.push_str(name);
                acc.push('=');
                acc.push_str(value);
                acc
            },
        );

        Ok(Self {
            role_instance_id: RoleInstanceId::derive(&canonical),
            role_def_id: definition.id().clone(),
            values,
        })
    }

    pub fn id(&self) -> &RoleInstanceId {
        &self.role_instance_id
    }

    pub fn role_def_id(&self) -> &RoleDefinitionId {
        &self.role_def_id
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Resolves the permissions granted by this binding.
    ///
    /// Values travel through the definition's reverse mapping to reach the
    /// permission parameters they feed.
    pub fn permissions(&self, definition: &RoleDefinition) -> Vec<Permission> {
        let qualified: BTreeMap<String, String> = definition
            .reverse_mapping()
            .into_iter()
            .filter_map(|(target, entry)| {
                self.values
                    .get(&entry.local)
                    .map(|value| (target, value.clone()))
            })
            .collect();

        definition
            .permissions()
            .iter()
            .map(|permission| permission.resolve(&qualified))
            .collect()
    }
}
