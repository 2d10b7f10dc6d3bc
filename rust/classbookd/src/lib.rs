pub mod db;
pub mod engine;
pub mod ipc;
pub mod logging;
