#![forbid(unsafe_code)]

mod client;
mod error;
mod traits;
mod types;

#[cfg(feature = "mock")]
pub mod mock;

pub use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    traits::{ByteStream, Net, NetBody},
    types::{Headers, NetOptions, RangeSpec, RetryPolicy},
};
