pub mod config_file;
pub mod keygen;
pub mod logs;
pub mod supervisor;
