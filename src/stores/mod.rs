pub mod file_history_store;
