// Plugin infrastructure for Armada

pub mod callbacks;
pub mod processor;
pub mod render;

pub use callbacks::{create_processor, JsonLogProcessor, TimerProcessor};
pub use processor::{Processor, Processors};
pub use render::RenderProcessor;
