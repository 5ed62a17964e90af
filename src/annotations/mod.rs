pub mod detection;
pub mod rectangle;
