mod error;
mod fields;
mod traits;
mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::BackendError;
pub use fields::{FieldKind, FieldRequest, FieldValue, Prompter, SelectOption, ask_confirm, ask_text};
pub use traits::{BackendPlugin, SetupContext};
pub use types::{
    BackendConfig, BackendDescriptor, BackendKind, TailscalePeer, ValidationReport,
};
