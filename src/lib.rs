pub mod api;
pub mod client_ip;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod geo;
pub mod models;
pub mod shutdown;
pub mod stats;
pub mod storage;
pub mod writer;
