pub mod cache;
pub mod config;
pub mod error;
pub mod komiku;
pub mod library;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
