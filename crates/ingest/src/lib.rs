pub mod anomalies;
pub mod http;
pub mod push;
pub mod reporter;
pub mod server;

#[cfg(test)]
pub(crate) mod fakes;
