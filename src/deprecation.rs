//! Versioning and deprecation metadata for capabilities.

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityKind;

/// Structured deprecation notice attached to a tool, resource or prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deprecation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
}

impl Deprecation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn since(mut self, version: impl Into<String>) -> Self {
        self.since = Some(version.into());
        self
    }

    pub fn remove_in(mut self, version: impl Into<String>) -> Self {
        self.remove_in = Some(version.into());
        self
    }

    pub fn replaced_by(mut self, name: impl Into<String>) -> Self {
        self.replaced_by = Some(name.into());
        self
    }

    /// Render the human-readable notice surfaced in list responses.
    ///
    /// ```
    /// use mcpcore::Deprecation;
    ///
    /// let d = Deprecation::new().message("old").since("1.0").remove_in("2.0").replaced_by("new");
    /// assert_eq!(d.render(), "old Deprecated since 1.0. Will be removed in 2.0. Use 'new' instead.");
    /// ```
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(message) = &self.message {
            parts.push(message.clone());
        }
        if let Some(since) = &self.since {
            parts.push(format!("Deprecated since {}.", since));
        }
        if let Some(remove_in) = &self.remove_in {
            parts.push(format!("Will be removed in {}.", remove_in));
        }
        if let Some(replaced_by) = &self.replaced_by {
            parts.push(format!("Use '{}' instead.", replaced_by));
        }
        if parts.is_empty() {
            return "This item is deprecated.".into();
        }
        parts.join(" ")
    }
}

/// Version and deprecation state shared by every capability definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Versioning {
    pub version: Option<String>,
    pub deprecated: bool,
    pub deprecation_message: Option<String>,
}

impl Versioning {
    pub fn deprecate(&mut self, deprecation: &Deprecation) {
        self.deprecated = true;
        self.deprecation_message = Some(deprecation.render());
    }

    /// Append `version` / `deprecated` / `deprecationMessage` to a list entry.
    pub(crate) fn annotate(&self, entry: &mut serde_json::Value) {
        if let Some(version) = &self.version {
            entry["version"] = serde_json::json!(version);
        }
        if self.deprecated {
            entry["deprecated"] = serde_json::json!(true);
            if let Some(message) = &self.deprecation_message {
                entry["deprecationMessage"] = serde_json::json!(message);
            }
        }
    }

    /// Emit the invocation-time warning for deprecated capabilities.
    pub(crate) fn warn_if_deprecated(&self, kind: CapabilityKind, id: &str) {
        if !self.deprecated {
            return;
        }
        match &self.deprecation_message {
            Some(message) => tracing::warn!(
                kind = %kind,
                id,
                "{} '{}' is deprecated: {}",
                kind,
                id,
                message
            ),
            None => tracing::warn!(kind = %kind, id, "{} '{}' is deprecated", kind, id),
        }
    }
}
