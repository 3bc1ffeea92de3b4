pub mod ply;
pub mod summary;

pub use ply::{read_ply_header, write_ply, PlyError, PlyHeader};
pub use summary::{write_processing_info, ProcessingInfo};
