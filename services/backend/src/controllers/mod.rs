pub mod pipeline;
pub mod process;
pub mod retrieval;
pub mod root;
pub mod stream;
pub mod tools;
pub mod transform;
pub mod workspace;
pub use pipeline::PipelineController;
pub use root::RootController;
