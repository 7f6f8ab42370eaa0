use std::path::PathBuf;

/// Looks up executables on the host search path. Implementations must not
/// cache: a tool may appear or disappear between two calls.
pub trait ToolLocator: Send + Sync {
    fn locate(&self, tool: &str) -> Option<PathBuf>;

    fn is_installed(&self, tool: &str) -> bool {
        self.locate(tool).is_some()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathLocator;

impl ToolLocator for PathLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::{PathLocator, ToolLocator};

    #[cfg(unix)]
    #[test]
    fn path_locator_finds_shell() {
        assert!(PathLocator.is_installed("sh"));
    }

    #[test]
    fn path_locator_misses_unknown_tool() {
        assert!(
            PathLocator
                .locate("stowage-definitely-missing-binary")
                .is_none()
        );
    }
}
