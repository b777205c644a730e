pub mod fs_atomic;
pub mod paths;
pub mod text;
pub mod time;
