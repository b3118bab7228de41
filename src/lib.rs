// HTTP disk cache library

pub mod cache;
pub mod config;
pub mod constants;
pub mod logging;
pub mod resource;
pub mod storage;
