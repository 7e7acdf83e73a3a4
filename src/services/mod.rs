pub mod compute;
pub mod copy_engine;
pub mod fleet;
pub mod forwarder;
pub mod lease;
pub mod queue;
pub mod storage;
pub mod worker;
