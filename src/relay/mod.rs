pub mod executor;
pub mod normalizer;
pub mod response_builder;
pub mod service;
pub mod types;

pub use executor::{execute, execute_with_cancel, execute_with_policy, RedirectPolicy};
pub use normalizer::{normalize, Normalizer, DEFAULT_USER_AGENT};
pub use response_builder::{build_envelope, is_binary_content, is_json_content, EnvelopeParams};
pub use service::{HttpRelayService, RelayFuture, RelayService};
pub use types::*;
