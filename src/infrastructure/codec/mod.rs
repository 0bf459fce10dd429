//! FLAC codec infrastructure
//!
//! Encoding goes through flacenc, decoding through symphonia.

mod flac_encoder;
mod symphonia_decoder;

use std::path::Path;

pub use flac_encoder::{encode_to_flac, FlacStreamEncoder};
pub use symphonia_decoder::SymphoniaDecoder;

use crate::application::ports::{CodecError, StreamCodec, StreamDecoder, StreamEncoder};
use crate::domain::recording::StreamFormat;

/// The FLAC streaming codec
#[derive(Debug, Clone, Copy, Default)]
pub struct FlacCodec;

impl FlacCodec {
    pub fn new() -> Self {
        Self
    }
}

impl StreamCodec for FlacCodec {
    fn open_encoder(
        &self,
        path: &Path,
        format: StreamFormat,
    ) -> Result<Box<dyn StreamEncoder>, CodecError> {
        Ok(Box::new(FlacStreamEncoder::create(path, format)?))
    }

    fn open_decoder(&self, path: &Path) -> Result<Box<dyn StreamDecoder>, CodecError> {
        Ok(Box::new(SymphoniaDecoder::open(path)?))
    }
}
