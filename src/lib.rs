pub mod channel;
pub mod controller;
pub mod converter;
pub mod error;
pub mod lifecycle;
pub mod sampler;
