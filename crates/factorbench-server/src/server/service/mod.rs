//! Request handling for the factorize service.

pub mod handler;
