//! Services module
//!
//! The request path through the gateway: transform the caller's request,
//! dispatch it across the credential pool, relay the winning response.

pub mod backend_pool;
pub mod dispatcher;
pub mod relay;
pub mod transformer;
pub mod upstream;

pub use backend_pool::{Credential, CredentialPool};
pub use dispatcher::{AttemptFailure, AttemptOutcome, DispatchError, UpstreamDispatcher};
pub use relay::{relay_response, RelayOptions, Utf8Rechunker};
pub use transformer::{RequestTransformer, UpstreamRequest};
pub use upstream::{HttpUpstream, UpstreamError, UpstreamResponse, UpstreamTransport};
