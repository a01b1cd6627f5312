// Satiety: per-food satiety coefficients from population food diaries
//
// This is the library root. Each module corresponds to a stage (or shared
// concern) of the two-pass regression pipeline.

pub mod clustering;
pub mod config;
pub mod diary;
pub mod download;
pub mod error;
pub mod matrix;
pub mod output;
pub mod pipeline;
pub mod solver;
