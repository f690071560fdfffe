pub mod link;

pub use link::{SensorLink, SerialLink};
