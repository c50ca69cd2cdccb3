pub mod media_engine;
pub mod setting_engine;

pub use media_engine::{Codec, MediaEngine};
pub use setting_engine::SettingEngine;
