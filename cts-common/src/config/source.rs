//! Where a configuration value came from.

/// A value plus the `CTS_*` variable that supplied it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sourced<T> {
    pub value: T,
    pub var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self { value, var: None }
    }

    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self {
            value,
            var: Some(var.into()),
        }
    }

    pub fn is_from_env(&self) -> bool {
        self.var.is_some()
    }
}
