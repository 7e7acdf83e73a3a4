pub mod aws;
pub mod compute;
pub mod queue;
pub mod signals;
pub mod storage;
