pub mod error;
pub mod options;

pub use error::{CmrError, CmrResult};
pub use options::{ForceMode, OperationMode, SyncOptions};
