//! # pactum-contracts
//!
//! Shared types, schemas, and errors for the Pactum authorization layer.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions and error types.

pub mod contract;
pub mod error;
pub mod http;
pub mod policy;
pub mod subject;
