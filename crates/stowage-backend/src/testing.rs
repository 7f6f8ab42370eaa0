//! Headless prompter for exercising backend setup flows in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::fields::{FieldKind, FieldRequest, FieldValue, Prompter};

/// Answers prompts from a fixed script. Fields without a scripted answer fall
/// back to their default; fields without either are treated as cancelled.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: HashMap<String, FieldValue>,
    asked: Mutex<Vec<String>>,
    notes: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn answer(mut self, key: &str, value: FieldValue) -> Self {
        self.answers.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn text(self, key: &str, value: &str) -> Self {
        self.answer(key, FieldValue::Text(value.to_string()))
    }

    #[must_use]
    pub fn confirm(self, key: &str, value: bool) -> Self {
        self.answer(key, FieldValue::Bool(value))
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, request: &FieldRequest) -> Result<Option<FieldValue>, BackendError> {
        self.asked
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.key.to_string());

        if let Some(value) = self.answers.get(request.key) {
            return Ok(Some(value.clone()));
        }

        Ok(request.default.as_ref().map(|default| match request.kind {
            FieldKind::Confirm => FieldValue::Bool(default == "true"),
            _ => FieldValue::Text(default.clone()),
        }))
    }

    fn note(&self, message: &str) {
        self.notes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message.to_string());
    }
}
