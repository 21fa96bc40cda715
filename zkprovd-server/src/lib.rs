//! zkprovd-server: RPC handler layer for the zkprovd proving daemon.

pub mod http;
pub mod service;

pub use service::ProveService;
