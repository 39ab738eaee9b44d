pub mod configs;
pub mod crds;
pub mod determiners;
pub mod error;
pub mod formatters;
pub mod job_builder;
