pub mod broker;
pub mod ext;
pub mod status_code;

// Publicly re-export all error types from the submodules to simplify access
// from external code.
pub use broker::*;
pub use ext::*;
pub use status_code::*;

pub type BrokerResult<T> = Result<T, BrokerError>;
