//! Infrastructure layer wrapping the external pieces a relayed call needs:
//! DNS resolution, TLS connections and content decoding.

pub mod decompressor;
pub mod dns;
pub mod tls;

pub use decompressor::{decode_body, ContentCoding, DecodeError};
pub use dns::resolve_dns;
pub use tls::{connect_tls, tls_config, TlsError};
