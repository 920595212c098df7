pub(crate) mod audio_pipeline;
pub(crate) mod engine;
pub(crate) mod language;
pub(crate) mod models;
pub(crate) mod pcm_decode;
