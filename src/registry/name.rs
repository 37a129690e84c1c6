use std::fmt;

use crate::error::Error;

const MAX_SCOPE_LEN: usize = 64;
const MAX_PACKAGE_LEN: usize = 100;

/// Lowercases a scope and strips the display `@` prefix. Scopes are always
/// compared and stored in this form.
#[must_use]
pub fn normalize_scope(scope: &str) -> String {
    scope.trim_start_matches('@').to_ascii_lowercase()
}

/// A package coordinate: normalized owner scope plus package name. Unique
/// per normalized pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName {
    scope: String,
    name: String,
}

impl PackageName {
    /// Normalizes the scope and validates both components.
    pub fn new(scope: &str, name: &str) -> Result<Self, Error> {
        let scope = normalize_scope(scope);
        validate_component(&scope, "scope", MAX_SCOPE_LEN, false)
            .map_err(Error::Validation)?;
        validate_component(name, "package", MAX_PACKAGE_LEN, true).map_err(Error::Validation)?;

        Ok(Self {
            scope,
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display form used in persisted documents, e.g. `@alice/postgres`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("@{}/{}", self.scope, self.name)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}", self.scope, self.name)
    }
}

fn is_valid_name_char(c: char, allow_period: bool) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || (allow_period && c == '.')
}

fn validate_component(
    value: &str,
    entity: &str,
    max_len: usize,
    allow_period: bool,
) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{entity} name cannot be empty"));
    }
    if value.len() > max_len {
        return Err(format!("{entity} name cannot exceed {max_len} characters"));
    }
    if !value.chars().all(|c| is_valid_name_char(c, allow_period)) {
        let mut allowed = "lowercase alphanumeric characters, hyphens, and underscores".to_string();
        if allow_period {
            allowed.push_str(", and periods");
        }
        return Err(format!("{entity} name can only contain {allowed}"));
    }
    if value.starts_with('-') || value.starts_with('_') || value.starts_with('.') {
        return Err(format!(
            "{entity} name cannot start with a hyphen, underscore, or period"
        ));
    }
    Ok(())
}
