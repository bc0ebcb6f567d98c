pub mod serialization;

pub use serialization::{validate_output_rows, TableSerializer};
