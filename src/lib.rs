pub mod config;
pub mod error;
pub mod infra;
pub mod relay;
pub mod routes;
pub mod shared;

pub use config::Config;
pub use error::{AppError, NormalizeError, RelayError, RelayErrorKind};
pub use relay::{
    execute, normalize, NormalizedDescriptor, RequestBody, RequestDescriptor, ResponseBody,
    ResponseEnvelope,
};
pub use routes::{app, AppState};
