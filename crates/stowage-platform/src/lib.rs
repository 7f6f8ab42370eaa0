mod commands;
mod locate;
mod os;
mod paths;

pub use commands::{
    CommandOutcome, CommandOutput, CommandRunner, CommandSpec, LineControl, LineHandler,
    StreamOutcome, SystemRunner, effective_uid, is_root, run_interactive,
};
pub use locate::{PathLocator, ToolLocator};
pub use os::{OsFamily, OsInfo, PackageManager};
pub use paths::{AppPaths, AppPathsError};
