#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod activity_api;
pub mod background_tracker;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod export_data;
pub mod foreground_tracker;
pub mod gps_processor;
pub mod kv_store;
pub mod location;
pub mod logs;
pub mod raw_data_recorder;
pub mod session;
pub mod session_store;
pub mod utils;
