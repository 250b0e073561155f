#![forbid(unsafe_code)]

// Internal modules (exposed for advanced usage and testing)
pub mod callbacks;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod fragment;
pub mod http_loader;
pub mod options;
pub mod pump;

pub use callbacks::Callbacks;
pub use context::{
    LoadContext, LoadMode, LoadPayload, LoadResponse, LoadStats, LoaderConfig, ResponseType,
};
pub use coordinator::FragmentLoadCoordinator;
pub use error::{LoadError, LoadResult};
pub use events::{ErrorDetail, EventEmitter, LoadEvent};
pub use fragment::{Fragment, FragmentRange, MediaType};
pub use http_loader::{FragmentLoader, HttpLoader};
pub use options::{LoaderFactory, LoaderOptions, RequestHook};
pub use pump::StreamPump;
