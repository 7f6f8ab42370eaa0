use async_trait::async_trait;

use crate::error::BackendError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub hint: Option<String>,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Path,
    Select { options: Vec<SelectOption> },
    Confirm,
}

/// One value a backend needs from the operator. Backends describe what they
/// need; a [`Prompter`] decides how it is asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequest {
    pub key: &'static str,
    pub label: String,
    pub kind: FieldKind,
    pub default: Option<String>,
    pub required: bool,
}

impl FieldRequest {
    pub fn text(key: &'static str, label: impl Into<String>) -> Self {
        Self {
            key,
            label: label.into(),
            kind: FieldKind::Text,
            default: None,
            required: true,
        }
    }

    pub fn path(key: &'static str, label: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Path,
            ..Self::text(key, label)
        }
    }

    pub fn select(
        key: &'static str,
        label: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self {
            kind: FieldKind::Select { options },
            ..Self::text(key, label)
        }
    }

    pub fn confirm(key: &'static str, label: impl Into<String>, default: bool) -> Self {
        Self {
            kind: FieldKind::Confirm,
            default: Some(default.to_string()),
            ..Self::text(key, label)
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Option<impl Into<String>>) -> Self {
        if let Some(default) = default {
            self.default = Some(default.into());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
}

#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask for one field. `Ok(None)` means the operator cancelled.
    async fn ask(&self, request: &FieldRequest) -> Result<Option<FieldValue>, BackendError>;

    fn note(&self, message: &str);
}

/// Ask a text-like field and trim the answer. Empty answers to required
/// fields are rejected as configuration errors.
///
/// # Errors
/// Returns an error when the prompter fails or a required answer is empty.
pub async fn ask_text(
    prompter: &dyn Prompter,
    request: &FieldRequest,
) -> Result<Option<String>, BackendError> {
    let value = match prompter.ask(request).await? {
        None => return Ok(None),
        Some(FieldValue::Text(text)) => text.trim().to_string(),
        Some(FieldValue::Bool(flag)) => flag.to_string(),
    };

    if request.required && value.is_empty() {
        return Err(BackendError::configuration(format!(
            "{} must not be empty",
            request.label
        )));
    }
    Ok(Some(value))
}

/// # Errors
/// Returns an error when the prompter fails.
pub async fn ask_confirm(
    prompter: &dyn Prompter,
    request: &FieldRequest,
) -> Result<Option<bool>, BackendError> {
    Ok(match prompter.ask(request).await? {
        None => None,
        Some(FieldValue::Bool(flag)) => Some(flag),
        Some(FieldValue::Text(text)) => Some(matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "y" | "yes" | "true" | "j" | "ja"
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::{FieldKind, FieldRequest, FieldValue, ask_confirm, ask_text};
    use crate::error::BackendError;
    use crate::testing::ScriptedPrompter;

    #[tokio::test]
    async fn ask_text_trims_answers() {
        let prompter = ScriptedPrompter::new().answer("path", FieldValue::Text("  /srv  ".into()));

        let value = ask_text(&prompter, &FieldRequest::path("path", "Repository path"))
            .await
            .expect("prompt succeeds");

        assert_eq!(value.as_deref(), Some("/srv"));
    }

    #[tokio::test]
    async fn ask_text_rejects_empty_required_answer() {
        let prompter = ScriptedPrompter::new().answer("path", FieldValue::Text("   ".into()));

        let result = ask_text(&prompter, &FieldRequest::path("path", "Repository path")).await;

        assert!(matches!(result, Err(BackendError::Configuration { .. })));
    }

    #[tokio::test]
    async fn unanswered_field_without_default_cancels() {
        let prompter = ScriptedPrompter::new();

        let value = ask_text(&prompter, &FieldRequest::text("remote", "Remote"))
            .await
            .expect("prompt succeeds");

        assert!(value.is_none());
        assert_eq!(prompter.asked(), vec!["remote".to_string()]);
    }

    #[tokio::test]
    async fn ask_confirm_accepts_textual_answers() {
        let prompter = ScriptedPrompter::new().answer("create", FieldValue::Text("Ja".into()));

        let value = ask_confirm(&prompter, &FieldRequest::confirm("create", "Create?", false))
            .await
            .expect("prompt succeeds");

        assert_eq!(value, Some(true));
    }

    #[test]
    fn with_default_ignores_none() {
        let request = FieldRequest::text("user", "SSH user")
            .with_default(Some("root"))
            .with_default(None::<String>);

        assert_eq!(request.default.as_deref(), Some("root"));
        assert_eq!(request.kind, FieldKind::Text);
    }
}
