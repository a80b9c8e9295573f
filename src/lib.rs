pub mod app;
pub mod classify;
pub mod config;
pub mod cv;
pub mod domain;
pub mod error;
pub mod instrument;
pub mod manifest;
pub mod naming;
pub mod registry;
pub mod sample;
pub mod staging;
pub mod template;

pub mod output;
