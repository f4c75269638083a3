//! Request middleware.

pub mod api_key;
