pub mod builder;
pub mod cache;
pub mod client;
pub mod relations;
pub mod retry;
pub mod transport;
pub mod wiql;
