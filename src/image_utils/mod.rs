pub mod image;
pub mod image_io;
pub mod preprocess;
pub mod tensor_buffer;
