//! Album art thumbnail cache.
//!
//! Clients upload small images over HTTP; each upload lands in a bucket keyed
//! by the client's network address and is served back under a stable public
//! URL.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
#[cfg(test)]
mod test_support;
