pub mod byte_source;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod etag_aggregator;
pub mod hasher;
pub mod inspector;
pub mod partitioner;
pub mod presigner;
pub mod simulator_service;
pub mod transport;
pub mod verifier;
