//! Local video file source using FFmpeg.
//!
//! Frames are decoded in-memory and converted to RGB24. End of file is
//! reported as stream end after the decoder has been drained.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use super::SourceStats;
use crate::error::ProcessError;
use crate::frame::Frame;

struct Decoding {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

pub(crate) struct FfmpegFileSource {
    path: String,
    state: Option<Decoding>,
    frame_count: u64,
}

impl FfmpegFileSource {
    pub(crate) fn new(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track: {}", path))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: opened {} (ffmpeg, {}x{})",
            path,
            decoder.width(),
            decoder.height()
        );
        Ok(Self {
            path: path.to_string(),
            state: Some(Decoding {
                input,
                stream_index,
                decoder,
                scaler,
                eof_sent: false,
            }),
            frame_count: 0,
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub(crate) fn read(&mut self) -> Result<Option<Frame>> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("read from released source {}", self.path))?;
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            // Frames already buffered in the decoder come first.
            if state.decoder.receive_frame(&mut decoded).is_ok() {
                let frame = convert(&mut state.scaler, &decoded)?;
                self.frame_count += 1;
                return Ok(Some(frame));
            }
            if state.eof_sent {
                return Ok(None);
            }

            let mut sent = false;
            for (stream, packet) in state.input.packets() {
                if stream.index() != state.stream_index {
                    continue;
                }
                state
                    .decoder
                    .send_packet(&packet)
                    .map_err(|e| ProcessError::decode(format!("send packet: {e}")))?;
                sent = true;
                break;
            }
            if !sent {
                state.decoder.send_eof().context("flush ffmpeg decoder")?;
                state.eof_sent = true;
            }
        }
    }

    pub(crate) fn release(&mut self) {
        self.state = None;
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.path.clone(),
        }
    }
}

fn convert(
    scaler: &mut ffmpeg::software::scaling::Context,
    decoded: &ffmpeg::frame::Video,
) -> Result<Frame> {
    let mut rgb_frame = ffmpeg::frame::Video::empty();
    scaler
        .run(decoded, &mut rgb_frame)
        .map_err(|e| ProcessError::decode(format!("scale frame to RGB: {e}")))?;
    let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
    Ok(Frame::new(pixels, width, height, 3)?)
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
