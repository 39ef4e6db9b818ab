//! API handlers module

pub mod documents;
pub mod graph;
pub mod health;
