pub mod config;
pub mod decode;
pub mod device;
pub mod playback;
pub mod resample;
pub mod sink;
