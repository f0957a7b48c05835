pub mod api;
pub mod normalize;
pub mod notify;
pub mod ws;

#[cfg(feature = "client")]
pub mod client;
