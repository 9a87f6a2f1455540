pub mod bridge;
pub mod cli;
pub mod config;
pub mod interpreter;
pub mod stdlib;

// Re-export main types
pub use bridge::{Bridge, CallFuture, DispatchResult, NativeCtx, Registry, RoutineError};
pub use config::Config;
pub use interpreter::{Fault, FrameId, Outcome, Program, Value, Vm};
