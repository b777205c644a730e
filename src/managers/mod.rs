pub mod dispatcher;
pub mod navigation;
pub mod ssh;
