pub mod extractor;

pub use extractor::{TesseractExtractor, TextExtractor};
