//! Tools, their content items and custom routes registered by the embedding application

pub mod content;
pub mod routes;
pub mod tools;
