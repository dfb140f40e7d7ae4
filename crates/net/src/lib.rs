#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for kiln
//!
//! HTTP transport with failure classification and a fixed-wait retry
//! policy, conditional fetching of remote index snapshots, and a bounded
//! pool that downloads prebuilt packages into the local cache.

mod client;
mod index;
mod pool;
mod retry;

pub use client::{Fetched, NetClient, NetConfig};
pub use index::{fetch_backends, fetch_index};
pub use pool::{DownloadPool, DownloadRequest, DownloadedPackage};
pub use retry::RetryPolicy;
