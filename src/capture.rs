use std::path::Path;
use std::sync::OnceLock;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use ffmpeg::util::frame::video::Video;
use ffmpeg::util::error::EAGAIN;
use ffmpeg::{decoder, format, media, rescale, software, Rational};
use ffmpeg_next::{self as ffmpeg};
use image::codecs::jpeg;
use image::RgbImage;
use tracing::{debug, warn};

use crate::error::{BoxError, SampleError};

const JPEG_QUALITY: u8 = 95;

static INIT: OnceLock<Result<(), ffmpeg::Error>> = OnceLock::new();

pub(crate) fn init() -> Result<(), ffmpeg::Error> {
    INIT.get_or_init(|| {
        ffmpeg::init()?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        Ok(())
    })
    .clone()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StreamMetadata {
    pub(crate) frame_rate: f64,
    pub(crate) frame_count: i64,
}

/// A sequential source of decoded video frames.
///
/// The source owns the underlying stream handle; dropping it releases the
/// stream.
pub(crate) trait FrameSource {
    fn metadata(&self) -> StreamMetadata;

    /// Moves to the next decoded frame, returning `false` once the stream is
    /// exhausted.
    fn advance(&mut self) -> Result<bool, BoxError>;

    /// Converts the current frame to RGB. Only valid after `advance`
    /// returned `true`.
    fn current_image(&mut self) -> Result<RgbImage, BoxError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SamplingAdvisory {
    /// The interval covers the whole stream, so only one frame is kept.
    LowSampleRate { interval: u64, frame_count: i64 },
    /// The interval was clamped up to 1, so every frame is kept.
    HighSampleRate { raw_interval: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SamplingPlan {
    pub(crate) interval: u64,
    pub(crate) raw_interval: f64,
    pub(crate) advisories: Vec<SamplingAdvisory>,
}

impl SamplingPlan {
    /// Derives `clamp(round(frame_rate / sample_rate), 1, frame_count)`.
    ///
    /// `metadata` must already be validated (both fields positive).
    pub(crate) fn new(metadata: StreamMetadata, sample_rate: f64) -> Self {
        let raw_interval = (metadata.frame_rate / sample_rate).round();
        let frame_count = metadata.frame_count as u64;
        let interval = if raw_interval < 1.0 {
            1
        } else if raw_interval >= frame_count as f64 {
            frame_count
        } else {
            raw_interval as u64
        };

        let mut advisories = Vec::new();
        if interval >= frame_count {
            advisories.push(SamplingAdvisory::LowSampleRate {
                interval,
                frame_count: metadata.frame_count,
            });
        }
        if raw_interval < 1.0 {
            advisories.push(SamplingAdvisory::HighSampleRate { raw_interval });
        }

        Self {
            interval,
            raw_interval,
            advisories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncodedFrame {
    pub(crate) index: u64,
    pub(crate) base64: String,
}

impl EncodedFrame {
    pub(crate) fn encode(index: u64, image: &RgbImage) -> Result<Self, BoxError> {
        let mut jpeg_data = Vec::new();
        let mut encoder = jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, JPEG_QUALITY);
        encoder.encode(
            image,
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )?;

        Ok(Self {
            index,
            base64: BASE64_STANDARD.encode(jpeg_data),
        })
    }

    pub(crate) fn data_url(&self) -> String {
        "data:image/jpeg;base64,".to_owned() + &self.base64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SampledFrames {
    pub(crate) frames: Vec<EncodedFrame>,
    pub(crate) interval: u64,
    pub(crate) advisories: Vec<SamplingAdvisory>,
}

/// Samples `path` at roughly `sample_rate` frames per second using ffmpeg.
pub(crate) fn sample_video(path: &Path, sample_rate: f64) -> Result<SampledFrames, SampleError> {
    sample_frames(path, sample_rate, VideoFile::open)
}

/// Samples frames from the source produced by `open`.
///
/// The sample rate is checked before `open` is called. The source is dropped
/// before this function returns, whichever way it returns.
pub(crate) fn sample_frames<S, F>(
    path: &Path,
    sample_rate: f64,
    open: F,
) -> Result<SampledFrames, SampleError>
where
    S: FrameSource,
    F: FnOnce(&Path) -> Result<S, BoxError>,
{
    // NaN fails this check too
    if !(sample_rate > 0.0) {
        return Err(SampleError::InvalidArgument(sample_rate));
    }

    let mut source = open(path).map_err(|source| SampleError::StreamOpen {
        path: path.to_path_buf(),
        source,
    })?;

    let metadata = source.metadata();
    if !(metadata.frame_rate > 0.0) || metadata.frame_count <= 0 {
        return Err(SampleError::InvalidMetadata {
            frame_rate: metadata.frame_rate,
            frame_count: metadata.frame_count,
        });
    }

    let plan = SamplingPlan::new(metadata, sample_rate);
    for advisory in &plan.advisories {
        match advisory {
            SamplingAdvisory::LowSampleRate {
                interval,
                frame_count,
            } => warn!(
                "sample rate {sample_rate} is too low (interval {interval} >= {frame_count} frames), only one frame will be sampled"
            ),
            SamplingAdvisory::HighSampleRate { raw_interval } => warn!(
                "sample rate {sample_rate} is too high (raw interval {raw_interval}), all frames will be sampled and may exceed request limits"
            ),
        }
    }
    debug!(
        frame_rate = metadata.frame_rate,
        frame_count = metadata.frame_count,
        raw_interval = plan.raw_interval,
        interval = plan.interval,
        "sampling {}",
        path.display()
    );

    let processing = |source| SampleError::Processing {
        path: path.to_path_buf(),
        source,
    };

    let mut frames = Vec::new();
    let mut index = 0_u64;
    while source.advance().map_err(processing)? {
        if index % plan.interval == 0 {
            let image = source.current_image().map_err(processing)?;
            frames.push(EncodedFrame::encode(index, &image).map_err(processing)?);
        }
        index += 1;
    }
    debug!("sampled {} of {} frames", frames.len(), index);

    Ok(SampledFrames {
        frames,
        interval: plan.interval,
        advisories: plan.advisories,
    })
}

/// An ffmpeg-backed video file opened for sequential decoding.
pub(crate) struct VideoFile {
    input: format::context::Input,
    stream_index: usize,
    decoder: decoder::Video,
    scaler: software::scaling::context::Context,
    decoded: Video,
    metadata: StreamMetadata,
    eof_sent: bool,
}

impl VideoFile {
    pub(crate) fn open(path: &Path) -> Result<Self, BoxError> {
        init()?;

        let input = format::input(&path)?;
        let video_stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or(ffmpeg::Error::StreamNotFound)?;
        let stream_index = video_stream.index();

        let decoder = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())?
            .decoder()
            .video()?;

        let scaler = software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            software::scaling::Flags::BILINEAR,
        )?;

        let metadata = stream_metadata(
            video_stream.frames(),
            video_stream.avg_frame_rate(),
            video_stream.rate(),
            video_stream.duration(),
            video_stream.time_base(),
            input.duration(),
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            decoded: Video::empty(),
            metadata,
            eof_sent: false,
        })
    }
}

impl FrameSource for VideoFile {
    fn metadata(&self) -> StreamMetadata {
        self.metadata
    }

    fn advance(&mut self) -> Result<bool, BoxError> {
        loop {
            if let Some(decoded) = decode_status(self.decoder.receive_frame(&mut self.decoded))? {
                return Ok(decoded);
            }
            if self.eof_sent {
                return Ok(false);
            }
            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                None => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn current_image(&mut self) -> Result<RgbImage, BoxError> {
        let mut rgb_frame = Video::empty();
        self.scaler.run(&self.decoded, &mut rgb_frame)?;
        rgb_image(
            rgb_frame.width(),
            rgb_frame.height(),
            rgb_frame.stride(0),
            rgb_frame.data(0),
        )
    }
}

/// Frame rate from the average rate, else the base rate; frame count from the
/// stream header, else estimated from the stream or container duration. Fields
/// nothing can be derived for are 0.
fn stream_metadata(
    frames: i64,
    avg_rate: Rational,
    base_rate: Rational,
    stream_duration: i64,
    time_base: Rational,
    container_duration: i64,
) -> StreamMetadata {
    let frame_rate = [avg_rate, base_rate]
        .into_iter()
        .find(|rate| rate.numerator() > 0 && rate.denominator() > 0)
        .map(f64::from)
        .unwrap_or(0.0);

    let frame_count = if frames > 0 {
        frames
    } else {
        let seconds = if stream_duration > 0 && time_base.denominator() > 0 {
            stream_duration as f64 * f64::from(time_base)
        } else {
            container_duration.max(0) as f64 * f64::from(rescale::TIME_BASE)
        };
        (seconds * frame_rate).round() as i64
    };

    StreamMetadata {
        frame_rate,
        frame_count,
    }
}

/// Maps a `receive_frame` result to `Some(true)` for a frame, `Some(false)` at
/// end of stream and `None` when the decoder needs more input.
fn decode_status(result: Result<(), ffmpeg::Error>) -> Result<Option<bool>, BoxError> {
    match result {
        Ok(()) => Ok(Some(true)),
        Err(ffmpeg::Error::Eof) => Ok(Some(false)),
        Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Copies packed RGB24 rows out of a plane whose rows are `stride` bytes apart.
fn rgb_image(width: u32, height: u32, stride: usize, data: &[u8]) -> Result<RgbImage, BoxError> {
    let row_len = width as usize * 3;
    if stride < row_len || stride == 0 {
        return Err("decoded frame stride is shorter than its width".into());
    }

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        pixels.extend_from_slice(
            row.get(..row_len)
                .ok_or("decoded frame row is shorter than its width")?,
        );
    }

    Ok(RgbImage::from_raw(width, height, pixels)
        .ok_or("failed to create image buffer from decoded frame")?)
}

impl Drop for VideoFile {
    fn drop(&mut self) {
        debug!("releasing video stream {}", self.stream_index);
    }
}
