//! Command line configuration for the server.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::classifier::DEFAULT_INTRA_THREADS;
use crate::preprocessing::Normalization;

#[cfg(debug_assertions)]
pub const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
pub const LOG_LEVEL: LevelFilter = LevelFilter::Info;

pub const DEFAULT_FOOD_MODEL: &str = "mobilenetv3_food41.onnx";
pub const DEFAULT_FRUIT_MODEL: &str = "final_fruit_mobilenetv3.onnx";
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "mealmind")]
#[command(version)]
#[command(about = "Food and fruit image classification over HTTP")]
#[command(long_about = None)]
pub struct Config
{
    /// Path to the food classifier (ONNX)
    #[arg(long, env = "FOOD_MODEL_PATH", default_value = DEFAULT_FOOD_MODEL)]
    pub food_model: PathBuf,

    /// Path to the fruit classifier (ONNX)
    #[arg(long, env = "FRUIT_MODEL_PATH", default_value = DEFAULT_FRUIT_MODEL)]
    pub fruit_model: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Pixel normalization the models were trained with
    #[arg(long, value_enum, default_value_t = Normalization::Passthrough)]
    pub normalization: Normalization,

    /// Intra-op threads per ONNX Runtime session
    #[arg(long, default_value_t = DEFAULT_INTRA_THREADS)]
    pub intra_threads: usize,

    /// Maximum accepted request body, in bytes
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value_t = LOG_LEVEL)]
    pub log_level: LevelFilter,
}
