pub mod error;
pub mod filename;
pub mod logger;
pub mod text;

pub use filename::sanitize_filename;
