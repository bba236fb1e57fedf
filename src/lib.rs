pub mod cli;
pub mod client;
pub mod config;
pub mod discover;
pub mod exif_embed;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod prompt;
pub mod report;
pub mod util;
pub mod validate;
pub mod writer;
