//! Data representation: records, buffers, builders and dense indexes

pub mod buffer;
pub mod builder;
pub mod entity;
pub mod error;
pub mod index;
pub mod item;
