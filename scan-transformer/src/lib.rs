//! Image-pair to point conversion.
//!
//! [`line`] turns a laser-on / laser-off pair into one peak pixel per row,
//! [`triangulate`] lifts those pixels into scan space for a given turntable
//! angle.

pub mod kernel;
pub mod line;
pub mod triangulate;

pub use line::{extract_line, LineError, LineExtraction, LineExtractor};
pub use triangulate::Triangulator;
