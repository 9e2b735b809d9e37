//! Reading and writing glTF 2.0 scenes.

pub mod codec;
pub mod glb;
mod reader;
mod writer;

pub use reader::{read_path, read_slice};
pub use writer::{write_glb, GENERATOR};
