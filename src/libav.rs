//! In-process encoding through the FFmpeg libraries.
//!
//! [`LibavEncoder`] decodes each frame image with the `image` crate and feeds
//! it to an FFmpeg encoder linked via `ffmpeg-next`, so no `ffmpeg` executable
//! is needed at runtime. Frames are loaded one at a time; a long track is
//! never held in memory.

use std::fs;
use std::path::{Path, PathBuf};

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::encoder::video::Encoder as VideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Dictionary, Packet, Rational};
use image::imageops::FilterType;

use crate::encode::{FrameEncoder, VideoCodec, discard_partial, probe_frames};
use crate::error::StitchError;
use crate::utilities::{container_format, even_dimension, partial_output_path};

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }
}

/// Encodes frames with the linked FFmpeg libraries.
#[derive(Debug, Clone)]
pub struct LibavEncoder {
    codec: VideoCodec,
    crf: u32,
}

impl Default for LibavEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LibavEncoder {
    /// Create an H.264 encoder at CRF 23.
    pub fn new() -> Self {
        Self {
            codec: VideoCodec::H264,
            crf: 23,
        }
    }

    /// Set the codec.
    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value (0-51, lower is better).
    #[must_use]
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = crf.min(51);
        self
    }

    fn write(
        &self,
        frames: &[PathBuf],
        partial: &Path,
        output_path: &Path,
        fps: f64,
    ) -> Result<(), StitchError> {
        ffmpeg_next::init()?;

        let (source_width, source_height) = probe_frames(frames)?;
        let width = even_dimension(source_width);
        let height = even_dimension(source_height);

        let frame_rate = Rational::from(fps);
        let time_base = frame_rate.invert();
        let codec_id = self.codec.to_codec_id();

        let mut output = ffmpeg_next::format::output_as(partial, container_format(output_path))
            .map_err(|e| StitchError::EncodeError(format!("cannot open output: {e}")))?;

        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let encoder_codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            StitchError::EncodeError(format!("codec {codec_id:?} not available"))
        })?;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|e| StitchError::EncodeError(format!("cannot add stream: {e}")))?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .map_err(|e| StitchError::EncodeError(format!("cannot create codec context: {e}")))?
            .encoder()
            .video()
            .map_err(|e| StitchError::EncodeError(format!("cannot open video encoder: {e}")))?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(frame_rate));

        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut encoder_options = Dictionary::new();
        if self.codec != VideoCodec::Mpeg4 {
            encoder_options.set("crf", &self.crf.to_string());
        }
        let mut opened_encoder = encoder
            .open_as_with(encoder_codec, encoder_options)
            .map_err(|e| StitchError::EncodeError(format!("cannot open encoder: {e}")))?;

        stream.set_parameters(&opened_encoder);

        output
            .write_header()
            .map_err(|e| StitchError::EncodeError(format!("cannot write header: {e}")))?;

        let stream_time_base = output
            .stream(stream_index)
            .ok_or_else(|| StitchError::EncodeError("output stream vanished".to_string()))?
            .time_base();

        let mut scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|e| StitchError::EncodeError(format!("cannot create scaler: {e}")))?;

        for (frame_index, path) in frames.iter().enumerate() {
            let img = image::open(path)?;
            let rgb = if img.width() != width || img.height() != height {
                img.resize_exact(width, height, FilterType::Lanczos3).to_rgb8()
            } else {
                img.to_rgb8()
            };

            let mut src_frame = VideoFrame::new(Pixel::RGB24, width, height);
            let stride = src_frame.stride(0);
            let src_data = src_frame.data_mut(0);
            let rgb_bytes = rgb.as_raw();
            let row_len = (width as usize) * 3;
            for y in 0..height as usize {
                let src_start = y * row_len;
                let dst_start = y * stride;
                src_data[dst_start..dst_start + row_len]
                    .copy_from_slice(&rgb_bytes[src_start..src_start + row_len]);
            }

            let mut dst_frame = VideoFrame::empty();
            scaler
                .run(&src_frame, &mut dst_frame)
                .map_err(|e| StitchError::EncodeError(format!("scaling failed: {e}")))?;
            dst_frame.set_pts(Some(frame_index as i64));

            opened_encoder
                .send_frame(&dst_frame)
                .map_err(|e| StitchError::EncodeError(format!("send_frame failed: {e}")))?;
            drain_packets(
                &mut opened_encoder,
                &mut output,
                stream_index,
                time_base,
                stream_time_base,
            )?;
        }

        opened_encoder
            .send_eof()
            .map_err(|e| StitchError::EncodeError(format!("send_eof failed: {e}")))?;
        drain_packets(
            &mut opened_encoder,
            &mut output,
            stream_index,
            time_base,
            stream_time_base,
        )?;

        output
            .write_trailer()
            .map_err(|e| StitchError::EncodeError(format!("cannot write trailer: {e}")))?;

        Ok(())
    }
}

/// Write every packet the encoder has ready.
fn drain_packets(
    encoder: &mut VideoEncoder,
    output: &mut Output,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
) -> Result<(), StitchError> {
    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(stream_index);
        packet.rescale_ts(encoder_time_base, stream_time_base);
        packet
            .write_interleaved(output)
            .map_err(|e| StitchError::EncodeError(format!("write packet failed: {e}")))?;
    }
    Ok(())
}

impl FrameEncoder for LibavEncoder {
    fn encode(&self, frames: &[PathBuf], output: &Path, fps: f64) -> Result<(), StitchError> {
        log::info!(
            "Encoding {} frames in-process to {:?} (codec={:?}, fps={:.3})",
            frames.len(),
            output,
            self.codec,
            fps,
        );
        if frames.is_empty() {
            return Err(StitchError::NoFrames);
        }

        let partial = partial_output_path(output);
        match self.write(frames, &partial, output, fps) {
            Ok(()) => {
                fs::rename(&partial, output).inspect_err(|_| discard_partial(&partial))?;
                Ok(())
            }
            Err(error) => {
                discard_partial(&partial);
                Err(error)
            }
        }
    }
}
