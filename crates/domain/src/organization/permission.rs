//! Permission definitions and resolved permissions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::OrganizationError;

/// Declaration of a single parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ParameterSpec {
    /// A parameter that must be supplied.
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    /// A parameter that may be omitted.
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// A permission template identified by `(scope, name)`.
///
/// Parameter ids are stored in the fully qualified form `scope:name:paramId`
/// so parameters of different permissions never collide once they are
/// gathered into one role definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    scope: String,
    name: String,
    description: String,
    parameters: BTreeMap<String, ParameterSpec>,
}

impl PermissionDefinition {
    /// Creates a permission definition, qualifying every parameter id.
    pub fn new(
        scope: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: impl IntoIterator<Item = (String, ParameterSpec)>,
    ) -> Result<Self, OrganizationError> {
        let scope = scope.into();
        let name = name.into();

        if scope.trim().is_empty() {
            return Err(OrganizationError::validation(
                "permission scope must not be empty",
            ));
        }
        if name.trim().is_empty() {
            return Err(OrganizationError::validation(
                "permission name must not be empty",
            ));
        }

        let parameters = parameters
            .into_iter()
            .map(|(id, spec)| (Self::qualify(&scope, &name, &id), spec))
            .collect();

        Ok(Self {
            scope,
            name,
            description: description.into(),
            parameters,
        })
    }

    /// Returns the fully qualified form of a parameter id.
    ///
    /// Ids that are already qualified for this permission are returned as is.
    pub fn qualify(scope: &str, name: &str, param_id: &str) -> String {
        let prefix = format!("{scope}:{name}:");
        if param_id.starts_with(&prefix) {
            param_id.to_string()
        } else {
            format!("{prefix}{param_id}")
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the `(scope, name)` identity.
    pub fn key(&self) -> (&str, &str) {
        (&self.scope, &self.name)
    }

    /// Parameters keyed by qualified id.
    pub fn parameters(&self) -> &BTreeMap<String, ParameterSpec> {
        &self.parameters
    }

    /// Qualified ids of the parameters marked required.
    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(id, _)| id.as_str())
    }

    /// Strips the `scope:name:` prefix from a qualified parameter id.
    pub fn local_param_id<'a>(&self, qualified: &'a str) -> &'a str {
        qualified
            .strip_prefix(&format!("{}:{}:", self.scope, self.name))
            .unwrap_or(qualified)
    }

    /// Resolves the permission from values keyed by qualified parameter id.
    pub fn resolve(&self, values: &BTreeMap<String, String>) -> Permission {
        let values = self
            .parameters
            .keys()
            .filter_map(|qualified| {
                values
                    .get(qualified)
                    .map(|value| (self.local_param_id(qualified).to_string(), value.clone()))
            })
            .collect();

        Permission {
            scope: self.scope.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            values,
        }
    }
}

/// A permission resolved for a concrete role binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub scope: String,
    pub name: String,
    pub description: String,
    /// Parameter values keyed by unqualified parameter id.
    pub values: BTreeMap<String, String>,
}
