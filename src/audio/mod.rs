pub mod decoder;
pub mod encoder;
pub mod resample;
pub mod window;
