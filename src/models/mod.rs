//! Core data models for the explorer gateway.
//!
//! These types describe what the object store hands back for a key and the
//! links the gateway issues for it. Nothing here outlives a single request.

pub mod object;
