pub mod app;
pub mod checksum_store;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod format;
pub mod fs_util;
pub mod hasher;
pub mod input;
pub mod output;
pub mod paths;
pub mod report;
pub mod source;
