//! Infrastructure layer - connections to the outside world

pub mod blockchain;
