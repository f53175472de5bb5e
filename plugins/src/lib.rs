pub mod factory;
pub mod storage;
