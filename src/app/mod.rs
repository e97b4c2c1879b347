//! Application module

pub mod cli;
pub mod serve;
pub mod startup;
