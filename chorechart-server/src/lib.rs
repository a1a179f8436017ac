pub mod schedule;
pub mod server;
pub mod stats;
pub mod storage;
