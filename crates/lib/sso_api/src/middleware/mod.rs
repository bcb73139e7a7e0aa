//! Request middleware.

pub mod service_trust;
