use std::path::PathBuf;

use log::{debug, error};

use super::message::WizardMessage;
use super::state::{NoticeLevel, Screen, WizardStatus};
use super::task::Task;
use super::Wizard;
use crate::config_store::ConfigDocument;
use crate::error::AppError;
use crate::i18n::Text;

impl Wizard {
    pub(super) fn handle_save(&mut self) -> Task<WizardMessage> {
        if self.session.screen() != Screen::Completion {
            debug!("Ignoring save outside the completion screen");
            return Task::none();
        }
        if self.saving {
            return Task::none();
        }

        let report = self.completeness();
        if !report.is_ok() {
            let error = AppError::configuration_incomplete(report.errors);
            self.notify(NoticeLevel::Error, error.to_string());
            return Task::none();
        }
        let Some(config) = self.session.draft().cloned() else {
            return Task::none();
        };

        let document =
            ConfigDocument::new(config, self.session.language, self.configuration.tested_at);
        let store = self.services.store.clone();
        self.saving = true;

        Task::perform(async move { store.save(&document) }, WizardMessage::Saved)
    }

    pub(super) fn handle_saved(&mut self, result: Result<PathBuf, AppError>) {
        self.saving = false;
        match result {
            Ok(saved_to) => {
                self.notify(
                    NoticeLevel::Success,
                    format!("{} {}", self.text(Text::Saved), saved_to.display()),
                );
                self.session.status = WizardStatus::Completed { saved_to };
            }
            Err(save_error) => {
                error!("Saving configuration failed: {save_error}");
                self.notify(NoticeLevel::Error, save_error.to_string());
            }
        }
    }
}
