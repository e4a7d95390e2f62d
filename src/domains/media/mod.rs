pub mod video;
pub mod voiceover;

pub use video::{VideoRenderRequest, VideoRunner};
pub use voiceover::{VoiceoverRequest, VoiceoverRunner};
