use std::path::Path;

use ffmpeg::util::frame::audio::Audio;
use ffmpeg::{
    channel_layout, codec, decoder, encoder, filter, format, media, Packet, Rational, Rescale,
};
use ffmpeg_next::{self as ffmpeg};
use tempfile::TempPath;
use tracing::debug;

use crate::capture;
use crate::error::AudioError;

/// Re-encodes one audio stream to AAC through an `anull` filter graph so the
/// encoder gets frames of the size it expects.
struct AudioTranscoder {
    decoder: decoder::Audio,
    encoder: encoder::Audio,
    filter_graph: filter::Graph,
    input_time_base: Rational,
    codec_time_base: Rational,
}

impl AudioTranscoder {
    fn new(
        input_stream: &format::stream::Stream,
        output: &mut format::context::Output,
    ) -> Result<Self, AudioError> {
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);
        let decoder = codec::context::Context::from_parameters(input_stream.parameters())?
            .decoder()
            .audio()?;

        let codec = encoder::find(codec::Id::AAC)
            .ok_or(ffmpeg::Error::EncoderNotFound)?
            .audio()?;
        let mut output_stream = output.add_stream(codec)?;
        let mut encoder = codec::context::Context::from_parameters(output_stream.parameters())?
            .encoder()
            .audio()?;

        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let channel_layout = codec
            .channel_layouts()
            .map(|layouts| layouts.best(source_layout(&decoder).channels()))
            .unwrap_or(channel_layout::ChannelLayout::STEREO);
        let codec_time_base = Rational(1, decoder.rate() as i32);

        encoder.set_channel_layout(channel_layout);
        encoder.set_rate(decoder.rate() as _);
        encoder.set_format(
            codec
                .formats()
                .and_then(|mut formats| formats.next())
                .ok_or(AudioError::Filter("AAC encoder reports no sample format"))?,
        );
        encoder.set_bit_rate(decoder.bit_rate());
        encoder.set_max_bit_rate(decoder.max_bit_rate());
        encoder.set_time_base(codec_time_base);
        output_stream.set_time_base(codec_time_base);

        let opened_encoder = encoder.open_as(codec)?;
        output_stream.set_parameters(&opened_encoder);

        let filter_graph = Self::filter_graph(&decoder, &opened_encoder, codec_time_base)?;

        Ok(Self {
            decoder,
            encoder: opened_encoder,
            filter_graph,
            input_time_base: input_stream.time_base(),
            codec_time_base,
        })
    }

    fn filter_graph(
        decoder: &decoder::Audio,
        encoder: &encoder::Audio,
        time_base: Rational,
    ) -> Result<filter::Graph, AudioError> {
        let mut filter_graph = filter::Graph::new();

        let args = format!(
            "time_base={}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
            time_base,
            decoder.rate(),
            decoder.format().name(),
            source_layout(decoder).bits()
        );

        filter_graph.add(
            &filter::find("abuffer").ok_or(AudioError::Filter("abuffer filter not found"))?,
            "in",
            &args,
        )?;
        filter_graph.add(
            &filter::find("abuffersink").ok_or(AudioError::Filter("abuffersink filter not found"))?,
            "out",
            "",
        )?;

        {
            let mut out = filter_graph
                .get("out")
                .ok_or(AudioError::Filter("missing filter graph output"))?;
            out.set_sample_format(encoder.format());
            out.set_channel_layout(encoder.channel_layout());
            out.set_sample_rate(encoder.rate());
        }

        filter_graph.output("in", 0)?.input("out", 0)?.parse("anull")?;
        filter_graph.validate()?;

        if let Some(codec) = encoder.codec() {
            if !codec
                .capabilities()
                .contains(codec::capabilities::Capabilities::VARIABLE_FRAME_SIZE)
            {
                filter_graph
                    .get("out")
                    .ok_or(AudioError::Filter("missing filter graph output"))?
                    .sink()
                    .set_frame_size(encoder.frame_size());
            }
        }

        Ok(filter_graph)
    }

    fn send_packet_to_decoder(&mut self, packet: &Packet) -> Result<(), AudioError> {
        Ok(self.decoder.send_packet(packet)?)
    }

    fn send_eof_to_decoder(&mut self) -> Result<(), AudioError> {
        Ok(self.decoder.send_eof()?)
    }

    fn receive_and_process_decoded_frames(
        &mut self,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<(), AudioError> {
        let mut frame = Audio::empty();
        while self.decoder.receive_frame(&mut frame).is_ok() {
            let timestamp = frame
                .timestamp()
                .map(|ts| ts.rescale(self.input_time_base, self.codec_time_base));
            frame.set_pts(timestamp);
            self.filter_graph
                .get("in")
                .ok_or(AudioError::Filter("missing filter graph input"))?
                .source()
                .add(&frame)?;
            self.receive_and_process_filtered_frames(output, output_time_base)?;
        }
        Ok(())
    }

    fn flush_filter_graph(&mut self) -> Result<(), AudioError> {
        Ok(self
            .filter_graph
            .get("in")
            .ok_or(AudioError::Filter("missing filter graph input"))?
            .source()
            .flush()?)
    }

    fn receive_and_process_filtered_frames(
        &mut self,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<(), AudioError> {
        let mut frame = Audio::empty();
        while self
            .filter_graph
            .get("out")
            .ok_or(AudioError::Filter("missing filter graph output"))?
            .sink()
            .frame(&mut frame)
            .is_ok()
        {
            self.encoder.send_frame(&frame)?;
            self.receive_and_process_encoded_packets(output, output_time_base)?;
        }
        Ok(())
    }

    fn send_eof_to_encoder(&mut self) -> Result<(), AudioError> {
        Ok(self.encoder.send_eof()?)
    }

    fn receive_and_process_encoded_packets(
        &mut self,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<(), AudioError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.codec_time_base, output_time_base);
            packet.write_interleaved(output)?;
        }
        Ok(())
    }
}

/// Some containers leave the layout unset; assume mono or stereo from the
/// channel count.
fn source_layout(decoder: &decoder::Audio) -> channel_layout::ChannelLayout {
    let layout = decoder.channel_layout();
    if !layout.is_empty() {
        return layout;
    }
    match decoder.channels() {
        1 => channel_layout::ChannelLayout::MONO,
        _ => channel_layout::ChannelLayout::STEREO,
    }
}

/// Writes the best audio stream of `input_path` to `output_path` as AAC. The
/// container is picked from the output extension.
pub(crate) fn extract_audio_track(input_path: &Path, output_path: &Path) -> Result<(), AudioError> {
    capture::init()?;

    let mut input = format::input(&input_path)?;
    let mut output = format::output(&output_path)?;

    let (input_index, mut transcoder) = {
        let input_stream = input
            .streams()
            .best(media::Type::Audio)
            .ok_or_else(|| AudioError::NoAudioTrack(input_path.to_path_buf()))?;
        (
            input_stream.index(),
            AudioTranscoder::new(&input_stream, &mut output)?,
        )
    };

    output.write_header()?;
    let output_time_base = output
        .stream(0)
        .ok_or(ffmpeg::Error::StreamNotFound)?
        .time_base();

    for (stream, packet) in input.packets() {
        if stream.index() != input_index {
            continue;
        }
        transcoder.send_packet_to_decoder(&packet)?;
        transcoder.receive_and_process_decoded_frames(&mut output, output_time_base)?;
    }

    transcoder.send_eof_to_decoder()?;
    transcoder.receive_and_process_decoded_frames(&mut output, output_time_base)?;
    transcoder.flush_filter_graph()?;
    transcoder.receive_and_process_filtered_frames(&mut output, output_time_base)?;
    transcoder.send_eof_to_encoder()?;
    transcoder.receive_and_process_encoded_packets(&mut output, output_time_base)?;

    output.write_trailer()?;
    debug!(
        "extracted audio of {} to {}",
        input_path.display(),
        output_path.display()
    );

    Ok(())
}

/// Extracts the audio of `input_path` into a temporary `.m4a` file, removed
/// when the returned path is dropped.
pub(crate) fn extract_to_temp(input_path: &Path) -> Result<TempPath, AudioError> {
    let audio_path = tempfile::Builder::new()
        .prefix("vidsight-audio-")
        .suffix(".m4a")
        .tempfile()?
        .into_temp_path();
    extract_audio_track(input_path, &audio_path)?;
    Ok(audio_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_an_ffmpeg_error() {
        let output = tempfile::Builder::new().suffix(".m4a").tempfile().unwrap();
        let result = extract_audio_track(Path::new("/no/such/video.mp4"), output.path());
        assert!(matches!(result, Err(AudioError::Ffmpeg(_))));
    }

    #[test]
    fn temp_output_is_removed_on_failure() {
        let before: Vec<_> = std::env::temp_dir()
            .read_dir()
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("vidsight-audio-"))
            .map(|entry| entry.path())
            .collect();

        assert!(extract_to_temp(Path::new("/no/such/video.mp4")).is_err());

        let leaked = std::env::temp_dir()
            .read_dir()
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("vidsight-audio-"))
            .any(|entry| !before.contains(&entry.path()));
        assert!(!leaked);
    }
}
