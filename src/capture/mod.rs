pub mod camera;
pub mod decoder;
pub mod frame;

pub use camera::{CameraSource, V4l2Camera};
pub use frame::Frame;
pub use frame::PixelFormat;
