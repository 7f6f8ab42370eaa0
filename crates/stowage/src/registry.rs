use std::collections::BTreeMap;
use std::sync::Arc;

use stowage_backend::{BackendDescriptor, BackendKind, BackendPlugin};
use stowage_filesystem::FilesystemBackend;
use stowage_rclone::CloudSyncBackend;
use stowage_tailscale::MeshPeerBackend;

use crate::error::AppError;
use crate::settings::AppSettings;

/// Startup table of the destinations this build knows about, ordered by kind.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    plugins: BTreeMap<BackendKind, Arc<dyn BackendPlugin>>,
}

impl BackendRegistry {
    pub fn with_defaults(settings: &AppSettings) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(FilesystemBackend::new(
            settings.default_repository_path.clone(),
        )));
        registry.register(Arc::new(CloudSyncBackend::default()));
        registry.register(Arc::new(MeshPeerBackend::default()));
        registry
    }

    /// Returns the plugin previously registered for the same kind, if any.
    pub fn register(&mut self, plugin: Arc<dyn BackendPlugin>) -> Option<Arc<dyn BackendPlugin>> {
        self.plugins.insert(plugin.kind(), plugin)
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn BackendPlugin>> {
        self.plugins.get(&kind).cloned()
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<dyn BackendPlugin>, AppError> {
        BackendKind::from_id(id)
            .and_then(|kind| self.get(kind))
            .ok_or_else(|| AppError::unknown_backend(id))
    }

    pub fn descriptors(&self) -> Vec<&'static BackendDescriptor> {
        self.plugins
            .values()
            .map(|plugin| plugin.descriptor())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::BackendRegistry;
    use crate::error::AppError;
    use crate::settings::AppSettings;
    use stowage_backend::BackendKind;
    use std::sync::Arc;
    use stowage_filesystem::FilesystemBackend;

    #[test]
    fn default_registry_lists_every_kind_in_order() {
        let registry = BackendRegistry::with_defaults(&AppSettings::default());

        let kinds: Vec<BackendKind> = registry
            .descriptors()
            .iter()
            .map(|descriptor| descriptor.kind)
            .collect();

        assert_eq!(kinds, BackendKind::ALL.to_vec());
    }

    #[test]
    fn lookup_by_identifier() {
        let registry = BackendRegistry::with_defaults(&AppSettings::default());

        let plugin = registry.lookup("mesh-peer").expect("mesh-peer is registered");

        assert_eq!(plugin.kind(), BackendKind::MeshPeer);
        assert!(plugin.check_dependencies().contains("tailscale"));
        assert_eq!(
            registry.lookup("ftp").err(),
            Some(AppError::unknown_backend("ftp"))
        );
    }

    #[test]
    fn empty_registry_reports_unregistered_kind() {
        let mut registry = BackendRegistry::default();
        assert!(registry.lookup("filesystem").is_err());

        let previous = registry.register(Arc::new(FilesystemBackend::default()));

        assert!(previous.is_none());
        assert!(registry.lookup("filesystem").is_ok());
        assert_eq!(registry.descriptors().len(), 1);
    }
}
