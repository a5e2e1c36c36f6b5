mod aws;
mod detection;
mod image_utils;
mod label;
mod pipeline;
mod retry;
mod storage;

pub mod app;
pub mod config;

pub use app::{start_app, AppError};
