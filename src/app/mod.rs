pub mod functions;
pub mod pipelines;
