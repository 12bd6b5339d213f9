#![deny(unreachable_patterns)]
//! Media tool adapter and derived-asset generators.
//!
//! This crate wraps the external `ffmpeg`/`ffprobe`/speech-to-text tools
//! used by the ingest pipeline and builds the derived assets the pipeline
//! produces for every archived video: thumbnail variants, a hover preview,
//! seek sprite sheets with WebVTT cue maps, waveform peaks, multi-variant
//! HLS, and captions.

pub mod captions;
pub mod command;
pub mod error;
pub mod fs_utils;
pub mod hls;
pub mod preview;
pub mod probe;
pub mod progress;
pub mod seek;
pub mod thumbnails;
pub mod transcript;
pub mod waveform;

pub use captions::{generate_captions, WhisperConfig, WhisperDevice, WhisperTask};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use hls::{
    demux_audio_track_to_hls, demux_video_to_hls, render_master_playlist, write_master_playlist,
    AudioTrack, VideoVariant,
};
pub use preview::generate_preview;
pub use probe::{probe_video, AudioStreamInfo, ContainerInfo, ProbeResult, VideoStreamInfo};
pub use progress::{Progress, ProgressSink};
pub use seek::{
    cue_count, cue_placement, generate_seek_level, generate_seek_sprites, level_dir, render_vtt,
    seek_exists, seek_manifest_path, sheet_filename, CuePlacement,
};
pub use thumbnails::generate_thumbnails;
pub use transcript::parse_vtt_to_text;
pub use waveform::{
    build_manifest, decode_peaks, encode_peaks, generate_waveform, manifest_path, no_audio_marker_path,
    peaks_path, waveform_dir, waveform_exists, PeakBucketer,
};
