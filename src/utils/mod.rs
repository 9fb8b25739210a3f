pub mod command;
pub mod discovery;
pub mod fastx;
pub mod file;
pub mod locks;
pub mod stats;
pub mod system;
