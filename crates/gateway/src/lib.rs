//! HTTP gateway to the backend capability surface.
//!
//! Everything network-facing lives here: the multi-origin endpoint resolver,
//! the per-endpoint capability clients, the CRM snapshot webhook client, and
//! the consent-collection collaborator. The agent crate only ever sees the
//! capability traits from `hearth-core`.

pub mod capabilities;
pub mod consent;
pub mod resolver;
pub mod snapshot;

pub use capabilities::HttpCapabilities;
pub use consent::ConsentRedirectCollaborator;
pub use resolver::{
    CapabilityRequest, CapabilityResponse, EndpointResolver, HttpTransport, Method,
    ReqwestTransport, ResolveError, TransportFailure,
};
pub use snapshot::WebhookSnapshotClient;
