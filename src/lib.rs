pub mod clock;
pub mod command;
pub mod config;
pub mod node;
pub mod packet;
pub mod pattern;
pub mod patterns;
pub mod phase;
pub mod radio;
pub mod scheduler;
pub mod sim;
pub mod status;
pub mod sync;
pub mod traits;
