//! Audio/video characterization via mediainfo, with loudness levels from
//! ffmpeg for containers that actually carry audio.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::Value;
use techmd_core::models::{
    AudioMetadata, AvMetadata, NewFilePart, OtherMetadata, PartType, TrackMetadata, TypeMetadata,
    VideoMetadata,
};
use tokio::sync::OnceCell;

use crate::characterizer::{Characterization, Characterizer};
use crate::command::{args, CommandRunner};
use crate::error::{CharacterizationError, ToolError};
use crate::version::query_version;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(v\d+\.\d+)").expect("valid regex"));

static VOLUME_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.\-]").expect("valid regex"));

/// MIDI has no sampled audio and makes ffprobe fail.
const MIDI_FORMAT: &str = "MIDI";

/// Non-blank textual value of a mediainfo field.
fn text(track: &Value, key: &str) -> Option<String> {
    match track.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer(track: &Value, key: &str) -> Option<i64> {
    let value = text(track, key)?;
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|f| f.trunc() as i64))
}

fn float(track: &Value, key: &str) -> Option<f64> {
    text(track, key)?.trim().parse().ok()
}

/// Converts mediainfo dates such as `UTC 2020-02-27 18:23:48` (the `UTC `
/// prefix is optional, colons and dashes may be missing) to
/// `2020-02-27T18:23:48+00:00`. `None` when blank or unparsable.
pub fn to_iso_time(time: Option<&str>) -> Option<String> {
    let time = time?.trim();
    if time.is_empty() {
        return None;
    }
    let compact: String = time.chars().filter(|c| *c != ':' && *c != '-').collect();
    let compact = compact.strip_prefix("UTC ").unwrap_or(&compact);
    NaiveDateTime::parse_from_str(compact, "%Y%m%d %H%M%S")
        .ok()
        .map(|parsed| parsed.and_utc().format("%Y-%m-%dT%H:%M:%S+00:00").to_string())
}

/// Level from the first ffmpeg volumedetect line mentioning `key`, e.g.
/// `[Parsed_volumedetect_0 @ 0x6000012f00b0] mean_volume: -24.2 dB`.
pub fn parse_volume(output: &str, key: &str) -> Option<f64> {
    let line = output.lines().find(|line| line.contains(key))?;
    let value = line.rsplit(':').next()?;
    VOLUME_NOISE.replace_all(value, "").trim().parse().ok()
}

fn general_metadata(track: &Value) -> AvMetadata {
    AvMetadata {
        video_count: integer(track, "VideoCount"),
        audio_count: integer(track, "AudioCount"),
        other_count: integer(track, "OtherCount"),
        file_extension: text(track, "FileExtension"),
        format: text(track, "Format"),
        format_profile: text(track, "Format_Profile"),
        codec_id: text(track, "CodecID"),
        duration: float(track, "Duration"),
        frame_rate: float(track, "FrameRate"),
        encoded_date: to_iso_time(text(track, "Encoded_Date").as_deref()),
    }
}

fn part(track: &Value, part_type: PartType) -> NewFilePart {
    NewFilePart {
        part_id: text(track, "ID"),
        order: integer(track, "StreamOrder").and_then(|order| i32::try_from(order).ok()),
        format: text(track, "Format"),
        ..NewFilePart::new(part_type)
    }
}

fn audio_metadata(track: &Value) -> AudioMetadata {
    AudioMetadata {
        format_profile: text(track, "Format_Profile"),
        codec_id: text(track, "CodecID"),
        channels: text(track, "Channels"),
        sampling_rate: integer(track, "SamplingRate"),
        bit_depth: integer(track, "BitDepth"),
        stream_size: integer(track, "StreamSize"),
        mean_volume: None,
        max_volume: None,
    }
}

fn video_metadata(track: &Value) -> VideoMetadata {
    VideoMetadata {
        format_profile: text(track, "Format_Profile"),
        codec_id: text(track, "CodecID"),
        height: integer(track, "Height"),
        width: integer(track, "Width"),
        display_aspect_ratio: float(track, "DisplayAspectRatio"),
        pixel_aspect_ratio: float(track, "PixelAspectRatio"),
        frame_rate: float(track, "FrameRate"),
        color_space: text(track, "ColorSpace"),
        chroma_subsampling: text(track, "ChromaSubsampling"),
        bit_depth: integer(track, "BitDepth"),
        language: text(track, "Language"),
        stream_size: integer(track, "StreamSize"),
        standard: text(track, "Standard"),
    }
}

fn other_metadata(track: &Value) -> OtherMetadata {
    OtherMetadata {
        other_type: text(track, "Type"),
        title: text(track, "Title"),
    }
}

/// Parses `mediainfo -f --Output=JSON` output into container metadata and
/// parts in track order. Audio parts come back without loudness levels.
pub fn parse_mediainfo(
    output: &str,
    filepath: &str,
) -> Result<(AvMetadata, Vec<NewFilePart>), CharacterizationError> {
    let report: Value = serde_json::from_str(output).map_err(|e| {
        ToolError::UnexpectedOutput(format!(
            "Unable to parse mediainfo output for {}: {}",
            filepath, e
        ))
    })?;

    let tracks: Vec<&Value> = match report.pointer("/media/track") {
        Some(Value::Array(tracks)) => tracks.iter().collect(),
        Some(track @ Value::Object(_)) => vec![track],
        _ => Vec::new(),
    };

    let mut general = None;
    let mut parts = Vec::new();
    for track in tracks {
        match track.get("@type").and_then(Value::as_str) {
            Some("General") => general = Some(general_metadata(track)),
            Some("Audio") => {
                let mut audio = part(track, PartType::Audio);
                audio.metadata = TrackMetadata::Audio(audio_metadata(track));
                parts.push(audio);
            }
            Some("Video") => {
                let mut video = part(track, PartType::Video);
                video.metadata = TrackMetadata::Video(video_metadata(track));
                parts.push(video);
            }
            Some("Other") => {
                let mut other = part(track, PartType::Other);
                other.metadata = TrackMetadata::Other(other_metadata(track));
                parts.push(other);
            }
            Some("Text") => parts.push(part(track, PartType::Text)),
            _ => {}
        }
    }

    let general =
        general.ok_or_else(|| CharacterizationError::MissingGeneralTrack(filepath.to_string()))?;
    Ok((general, parts))
}

pub struct MediaInfoCharacterizer {
    runner: Arc<dyn CommandRunner>,
    mediainfo: String,
    ffprobe: String,
    ffmpeg: String,
    version: OnceCell<String>,
}

impl MediaInfoCharacterizer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        mediainfo: impl Into<String>,
        ffprobe: impl Into<String>,
        ffmpeg: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            mediainfo: mediainfo.into(),
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
            version: OnceCell::new(),
        }
    }

    async fn has_audio_stream(&self, filepath: &Path) -> Result<bool, ToolError> {
        let output = self
            .runner
            .run(
                &self.ffprobe,
                &args([
                    OsStr::new("-i"),
                    filepath.as_os_str(),
                    OsStr::new("-show_streams"),
                    OsStr::new("-select_streams"),
                    OsStr::new("a"),
                    OsStr::new("-loglevel"),
                    OsStr::new("error"),
                ]),
            )
            .await?
            .check("Getting ffprobe track info")?;
        Ok(!output.combined().trim().is_empty())
    }

    async fn volume_levels(&self, filepath: &Path) -> Result<(Option<f64>, Option<f64>), ToolError> {
        let output = self
            .runner
            .run(
                &self.ffmpeg,
                &args([
                    OsStr::new("-i"),
                    filepath.as_os_str(),
                    OsStr::new("-af"),
                    OsStr::new("volumedetect"),
                    OsStr::new("-vn"),
                    OsStr::new("-sn"),
                    OsStr::new("-dn"),
                    OsStr::new("-f"),
                    OsStr::new("null"),
                    OsStr::new("/dev/null"),
                ]),
            )
            .await?
            .check("Getting ffmpeg volume detection")?;
        let combined = output.combined();
        Ok((
            parse_volume(&combined, "mean_volume"),
            parse_volume(&combined, "max_volume"),
        ))
    }
}

#[async_trait]
impl Characterizer for MediaInfoCharacterizer {
    fn tool_name(&self) -> &'static str {
        "mediainfo"
    }

    fn handles(&self, mimetype: &str) -> bool {
        mimetype.starts_with("audio/") || mimetype.starts_with("video/") || mimetype == "application/mp4"
    }

    #[tracing::instrument(skip(self), fields(process.executable.name = "mediainfo", file.path = %filepath.display()))]
    async fn characterize(&self, filepath: &Path) -> Result<Characterization, CharacterizationError> {
        let path = filepath.to_string_lossy();
        let output = self
            .runner
            .run(
                &self.mediainfo,
                &args([OsStr::new("-f"), OsStr::new("--Output=JSON"), filepath.as_os_str()]),
            )
            .await?
            .check(format!("Characterizing {}", path))?;

        let (general, mut parts) = parse_mediainfo(&output.stdout, &path)?;

        // Probed lazily so files without audio parts never touch ffprobe.
        let mut has_audio: Option<bool> = None;
        for part in parts.iter_mut() {
            let TrackMetadata::Audio(audio) = &mut part.metadata else {
                continue;
            };
            if part.format.as_deref() == Some(MIDI_FORMAT) {
                continue;
            }
            let probed = match has_audio {
                Some(probed) => probed,
                None => {
                    let probed = self.has_audio_stream(filepath).await?;
                    has_audio = Some(probed);
                    probed
                }
            };
            if probed {
                let (mean, max) = self.volume_levels(filepath).await?;
                audio.mean_volume = mean;
                audio.max_volume = max;
            }
        }

        tracing::debug!(parts = parts.len(), "Characterized audio/video file");

        Ok(Characterization {
            metadata: TypeMetadata::Av(general),
            parts,
        })
    }

    async fn version(&self) -> Result<String, CharacterizationError> {
        let version = self
            .version
            .get_or_try_init(|| async {
                query_version(
                    self.runner.as_ref(),
                    &self.mediainfo,
                    &args(["--Version"]),
                    &VERSION_PATTERN,
                    "mediainfo",
                )
                .await
            })
            .await?;
        Ok(version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::test_helpers::ScriptedRunner;

    const OGG_OUTPUT: &str = r#"{
"media": {
"@ref": "noam.ogg",
"track": [
{
"@type": "General",
"AudioCount": "1",
"FileExtension": "ogg",
"Format": "Ogg",
"FileSize": "10613",
"Duration": "1.002",
"OverallBitRate_Mode": "VBR",
"StreamSize": "593",
"Encoded_Date": "UTC 2020-02-27 18:23:48",
"File_Modified_Date": "UTC 2020-02-27 18:23:48"
},
{
"@type": "Audio",
"ID": "28470",
"Format": "Vorbis",
"Duration": "1.002",
"Channels": "1",
"SamplingRate": "44100",
"StreamSize": "10020"
}
]
}
}"#;

    const WEBM_OUTPUT: &str = r#"{
"media": {
"@ref": "max.webm",
"track": [
{
"@type": "General",
"VideoCount": "1",
"AudioCount": "1",
"FileExtension": "webm",
"Format": "WebM",
"Duration": "33.234",
"FrameRate": "29.970"
},
{
"@type": "Video",
"StreamOrder": "0",
"ID": "1",
"Format": "VP9",
"CodecID": "V_VP9",
"Width": "640",
"Height": "480",
"PixelAspectRatio": "1.000",
"DisplayAspectRatio": "1.333",
"FrameRate": "29.970",
"Standard": "NTSC"
},
{
"@type": "Audio",
"StreamOrder": "1",
"ID": "2",
"Format": "Opus",
"CodecID": "A_OPUS",
"Channels": "2",
"SamplingRate": "48000",
"BitDepth": "32",
"Title": "Stereo"
}
]
}
}"#;

    const VOLUME_OUTPUT: &str = "Input #0, ogg, from 'noam.ogg':
[Parsed_volumedetect_0 @ 0x6000012f00b0] n_samples: 44188
[Parsed_volumedetect_0 @ 0x6000012f00b0] mean_volume: -24.2 dB
[Parsed_volumedetect_0 @ 0x6000012f00b0] max_volume: -4.7 dB
";

    fn characterizer(runner: &ScriptedRunner) -> MediaInfoCharacterizer {
        MediaInfoCharacterizer::new(Arc::new(runner.clone()), "mediainfo", "ffprobe", "ffmpeg")
    }

    #[test]
    fn test_to_iso_time() {
        assert_eq!(
            to_iso_time(Some("UTC 2020-02-27 06:06:04")).as_deref(),
            Some("2020-02-27T06:06:04+00:00")
        );
        assert_eq!(
            to_iso_time(Some("2019:11:05 14:03:22")).as_deref(),
            Some("2019-11-05T14:03:22+00:00")
        );
        assert_eq!(to_iso_time(Some("")), None);
        assert_eq!(to_iso_time(Some("sometime last week")), None);
        assert_eq!(to_iso_time(None), None);
    }

    #[test]
    fn test_parse_volume() {
        assert_eq!(parse_volume(VOLUME_OUTPUT, "mean_volume"), Some(-24.2));
        assert_eq!(parse_volume(VOLUME_OUTPUT, "max_volume"), Some(-4.7));
        assert_eq!(parse_volume("no levels here", "max_volume"), None);
    }

    #[test]
    fn test_parse_webm() {
        let (general, parts) = parse_mediainfo(WEBM_OUTPUT, "max.webm").unwrap();
        assert_eq!(
            general,
            AvMetadata {
                video_count: Some(1),
                audio_count: Some(1),
                file_extension: Some("webm".to_string()),
                format: Some("WebM".to_string()),
                duration: Some(33.234),
                frame_rate: Some(29.97),
                ..AvMetadata::default()
            }
        );
        assert_eq!(parts.len(), 2);

        let video = &parts[0];
        assert_eq!(video.part_type, PartType::Video);
        assert_eq!(video.part_id.as_deref(), Some("1"));
        assert_eq!(video.order, Some(0));
        assert_eq!(video.format.as_deref(), Some("VP9"));
        assert_eq!(
            video.metadata.video(),
            Some(&VideoMetadata {
                codec_id: Some("V_VP9".to_string()),
                height: Some(480),
                width: Some(640),
                display_aspect_ratio: Some(1.333),
                pixel_aspect_ratio: Some(1.0),
                frame_rate: Some(29.97),
                standard: Some("NTSC".to_string()),
                ..VideoMetadata::default()
            })
        );

        let audio = &parts[1];
        assert_eq!(audio.part_type, PartType::Audio);
        assert_eq!(audio.order, Some(1));
        let audio = audio.metadata.audio().unwrap();
        assert_eq!(audio.codec_id.as_deref(), Some("A_OPUS"));
        assert_eq!(audio.channels.as_deref(), Some("2"));
        assert_eq!(audio.sampling_rate, Some(48000));
        assert_eq!(audio.bit_depth, Some(32));
    }

    #[test]
    fn test_parse_text_and_other_tracks() {
        let output = r#"{"media":{"track":[
            {"@type":"General","FileExtension":"xyz","Format":"XYZ"},
            {"@type":"Text","StreamOrder":"1","ID":"2"},
            {"@type":"Other","StreamOrder":"2","ID":"3","Type":"Time code","Title":"Dr. Strangelove"},
            {"@type":"Menu","ID":"4"}
        ]}}"#;
        let (general, parts) = parse_mediainfo(output, "make_believe.xyz").unwrap();
        assert_eq!(general.format.as_deref(), Some("XYZ"));
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].part_type, PartType::Text);
        assert_eq!(parts[0].part_id.as_deref(), Some("2"));
        assert_eq!(parts[0].format, None);
        assert_eq!(parts[0].metadata, TrackMetadata::None);

        let other = parts[1].metadata.other().unwrap();
        assert_eq!(other.other_type.as_deref(), Some("Time code"));
        assert_eq!(other.title.as_deref(), Some("Dr. Strangelove"));
    }

    #[test]
    fn test_single_track_object() {
        let output = r#"{"media":{"track":{"@type":"General","Format":"MPEG Audio"}}}"#;
        let (general, parts) = parse_mediainfo(output, "a.mp3").unwrap();
        assert_eq!(general.format.as_deref(), Some("MPEG Audio"));
        assert!(parts.is_empty());
    }

    #[test]
    fn test_missing_general_track_is_fatal() {
        let output = r#"{"media":{"track":[{"@type":"Audio","ID":"1"}]}}"#;
        let err = parse_mediainfo(output, "broken.mp4").unwrap_err();
        assert!(!err.is_tolerated());
        assert_eq!(err.to_string(), "Unable to find general track in broken.mp4");
    }

    #[tokio::test]
    async fn test_characterize_audio_with_volume_levels() {
        let runner = ScriptedRunner::new();
        runner.respond("mediainfo", CommandOutput::ok(OGG_OUTPUT));
        runner.respond("ffprobe", CommandOutput::ok("[STREAM]\ncodec_name=vorbis\n[/STREAM]\n"));
        runner.respond(
            "ffmpeg",
            CommandOutput {
                success: true,
                code: Some(0),
                stdout: String::new(),
                stderr: VOLUME_OUTPUT.to_string(),
            },
        );

        let characterization = characterizer(&runner)
            .characterize(Path::new("noam.ogg"))
            .await
            .unwrap();

        let av = characterization.metadata.av().unwrap();
        assert_eq!(av.audio_count, Some(1));
        assert_eq!(av.duration, Some(1.002));
        assert_eq!(av.encoded_date.as_deref(), Some("2020-02-27T18:23:48+00:00"));

        let part = &characterization.parts[0];
        assert_eq!(part.part_id.as_deref(), Some("28470"));
        assert_eq!(part.order, None);
        assert_eq!(
            part.metadata.audio(),
            Some(&AudioMetadata {
                channels: Some("1".to_string()),
                sampling_rate: Some(44100),
                stream_size: Some(10020),
                mean_volume: Some(-24.2),
                max_volume: Some(-4.7),
                ..AudioMetadata::default()
            })
        );
        assert_eq!(
            runner.invocations(),
            vec![
                "mediainfo -f --Output=JSON noam.ogg".to_string(),
                "ffprobe -i noam.ogg -show_streams -select_streams a -loglevel error".to_string(),
                "ffmpeg -i noam.ogg -af volumedetect -vn -sn -dn -f null /dev/null".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_probe_skips_volume_detection() {
        let runner = ScriptedRunner::new();
        runner.respond("mediainfo", CommandOutput::ok(OGG_OUTPUT));
        runner.respond("ffprobe", CommandOutput::ok(""));

        let characterization = characterizer(&runner)
            .characterize(Path::new("noam.ogg"))
            .await
            .unwrap();
        let audio = characterization.parts[0].metadata.audio().unwrap();
        assert_eq!(audio.mean_volume, None);
        assert_eq!(audio.max_volume, None);
        assert_eq!(runner.invocation_count("ffmpeg"), 0);
    }

    #[tokio::test]
    async fn test_midi_skips_ffprobe() {
        let output = r#"{"media":{"track":[
            {"@type":"General","Format":"MIDI"},
            {"@type":"Audio","Format":"MIDI"}
        ]}}"#;
        let runner = ScriptedRunner::new();
        runner.respond("mediainfo", CommandOutput::ok(output));

        let characterization = characterizer(&runner)
            .characterize(Path::new("tune.mid"))
            .await
            .unwrap();
        assert_eq!(characterization.parts.len(), 1);
        assert_eq!(runner.invocation_count("ffprobe"), 0);
        assert_eq!(runner.invocation_count("ffmpeg"), 0);
    }

    #[tokio::test]
    async fn test_audio_probe_runs_once_for_multiple_audio_parts() {
        let output = r#"{"media":{"track":[
            {"@type":"General","Format":"MPEG-4"},
            {"@type":"Audio","ID":"1","Format":"AAC"},
            {"@type":"Audio","ID":"2","Format":"AAC"}
        ]}}"#;
        let runner = ScriptedRunner::new();
        runner.respond("mediainfo", CommandOutput::ok(output));
        runner.respond("ffprobe", CommandOutput::ok(""));

        characterizer(&runner)
            .characterize(Path::new("two.m4a"))
            .await
            .unwrap();
        assert_eq!(runner.invocation_count("ffprobe"), 1);
    }

    #[tokio::test]
    async fn test_ffprobe_failure_is_tolerated() {
        let runner = ScriptedRunner::new();
        runner.respond("mediainfo", CommandOutput::ok(OGG_OUTPUT));
        runner.respond("ffprobe", CommandOutput::failed(1, "Invalid data found"));

        let err = characterizer(&runner)
            .characterize(Path::new("noam.ogg"))
            .await
            .unwrap_err();
        assert!(err.is_tolerated());
        assert!(err.to_string().starts_with("Getting ffprobe track info returned 1"));
    }

    #[tokio::test]
    async fn test_mediainfo_failure() {
        let runner = ScriptedRunner::new();
        runner.respond("mediainfo", CommandOutput::failed(1, "boom"));

        let err = characterizer(&runner)
            .characterize(Path::new("noam.ogg"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Characterizing noam.ogg returned 1: boom");
    }

    #[tokio::test]
    async fn test_version() {
        let runner = ScriptedRunner::new();
        runner.respond(
            "mediainfo",
            CommandOutput::ok("MediaInfo Command line,\nMediaInfoLib - v19.09\n"),
        );
        assert_eq!(characterizer(&runner).version().await.unwrap(), "v19.09");
    }

    #[test]
    fn test_handles_av_mimetypes() {
        let runner = ScriptedRunner::new();
        let characterizer = characterizer(&runner);
        assert!(characterizer.handles("audio/ogg"));
        assert!(characterizer.handles("video/webm"));
        assert!(characterizer.handles("application/mp4"));
        assert!(!characterizer.handles("application/pdf"));
    }
}
