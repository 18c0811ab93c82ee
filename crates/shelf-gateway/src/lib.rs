//! Smart Shelf Gateway Sync Adapter
//!
//! Boundary to the external system of record:
//! - [`protocol`]: layout / state / completion / pending-job payloads
//! - [`transport`]: the [`GatewayTransport`] seam and its reqwest client
//! - [`sync`]: bounded round trips that read into and write from the engine

mod error;

pub mod protocol;
pub mod sync;
pub mod transport;

pub use error::GatewayError;
pub use protocol::{
    LayoutPayload, PendingJobsRequest, PendingJobsResponse, ShelfComplete, ShelfIdRequest,
    ShelfIdResponse, StatePayload, SyncMode,
};
pub use sync::{CompletionSync, GatewaySync, StartupReport};
pub use transport::{GatewayTransport, HttpGateway};
