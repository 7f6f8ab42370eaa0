mod backend;

pub use backend::{DEFAULT_REPOSITORY_PATH, FilesystemBackend, MARKER_FILE};
