//! IP geolocation
//!
//! Lookups go through [`GeoCache`], which answers private addresses locally,
//! serves fresh cached payloads, and otherwise asks a [`GeoProvider`]
//! (ipinfo.io in production) once per miss.

pub mod cache;
pub mod models;
pub mod private;
pub mod provider;

pub use cache::GeoCache;
pub use models::{error_payload, GeoError, GeoInfo, GeoRecord, PRIVATE_IP_MESSAGE};
pub use private::is_private_ip;
pub use provider::{GeoProvider, IpInfoProvider};
