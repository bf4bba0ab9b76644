#![doc = include_str!("../README.md")]

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pool;
pub mod resolver;
pub mod workload;

#[cfg(test)]
mod testing;
