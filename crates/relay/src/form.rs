//! Run form: one value per declared tool argument.

use acorn_protocol::{FormValues, Tool};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("The form was already submitted")]
    Frozen,
}

/// Collects argument values until the run starts.
///
/// Keys are always exactly the declared names; anything else is rejected.
/// Values never set are sent as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormCollector {
    names: Vec<String>,
    values: FormValues,
    frozen: bool,
}

impl FormCollector {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let mut form = Self::default();
        form.redeclare(names);
        form
    }

    pub fn for_tool(tool: &Tool) -> Self {
        Self::new(tool.argument_names())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Current value of a declared argument (empty when never set)
    pub fn get(&self, name: &str) -> Option<&str> {
        if !self.accepts(name) {
            return None;
        }
        Some(self.values.get(name).map(String::as_str).unwrap_or(""))
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Validate a pending `set` without applying it.
    pub fn check(&self, name: &str) -> Result<(), FormError> {
        if self.frozen {
            return Err(FormError::Frozen);
        }
        if !self.accepts(name) {
            return Err(FormError::UnknownArgument(name.to_string()));
        }
        Ok(())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), FormError> {
        let name = name.into();
        self.check(&name)?;
        self.values.insert(name, value.into());
        Ok(())
    }

    /// Replace the declared names, keeping values of names still declared.
    pub fn redeclare(&mut self, names: impl IntoIterator<Item = String>) {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names.dedup();
        self.values.retain(|k, _| names.binary_search(k).is_ok());
        self.names = names;
    }

    /// Values for exactly the declared names
    pub fn values(&self) -> FormValues {
        self.names
            .iter()
            .map(|name| {
                let value = self.values.get(name).cloned().unwrap_or_default();
                (name.clone(), value)
            })
            .collect()
    }

    /// Stop accepting edits and return the values to send.
    pub fn freeze(&mut self) -> FormValues {
        self.frozen = true;
        self.values()
    }

    /// Reopen the form for editing (back from the transcript).
    pub fn thaw(&mut self) {
        self.frozen = false;
    }
}
