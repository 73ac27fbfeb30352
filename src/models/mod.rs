pub mod camera;
pub mod detection_event;

pub use camera::*;
pub use detection_event::*;
