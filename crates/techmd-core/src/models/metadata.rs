//! Type-specific metadata maps.
//!
//! Attributes a characterizer could not determine are left out of the
//! serialized JSON, matching what downstream consumers already expect. The
//! exceptions are the audio loudness levels, which are always present and
//! `null` when unknown.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
}

impl ImageMetadata {
    pub fn is_empty(&self) -> bool {
        self.height.is_none() && self.width.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub javascript: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    /// Whether the document has extractable text.
    #[serde(default)]
    pub text: bool,
}

/// Container-level attributes taken from the General track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_id: Option<String>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    /// ISO-8601 in UTC, e.g. `2020-02-27T06:06:04+00:00`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_id: Option<String>,
    /// Channel count or layout as reported, e.g. `"2"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_size: Option<i64>,
    /// dB
    #[serde(default)]
    pub mean_volume: Option<f64>,
    /// dB
    #[serde(default)]
    pub max_volume: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_aspect_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_aspect_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chroma_subsampling: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_size: Option<i64>,
    /// Broadcast standard, e.g. `NTSC`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// The one type-specific map a file record carries.
///
/// Serialized as three sibling keys (`image_metadata`, `pdf_metadata`,
/// `av_metadata`) of which at most one is non-null, so callers can rely on
/// all three keys being present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "TypeMetadataColumns", from = "TypeMetadataColumns")]
pub enum TypeMetadata {
    #[default]
    None,
    Image(ImageMetadata),
    Pdf(PdfMetadata),
    Av(AvMetadata),
}

impl TypeMetadata {
    pub fn image(&self) -> Option<&ImageMetadata> {
        match self {
            TypeMetadata::Image(m) => Some(m),
            _ => None,
        }
    }

    pub fn pdf(&self) -> Option<&PdfMetadata> {
        match self {
            TypeMetadata::Pdf(m) => Some(m),
            _ => None,
        }
    }

    pub fn av(&self) -> Option<&AvMetadata> {
        match self {
            TypeMetadata::Av(m) => Some(m),
            _ => None,
        }
    }
}

/// Column-shaped view of [`TypeMetadata`], one optional map per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeMetadataColumns {
    #[serde(default)]
    pub image_metadata: Option<ImageMetadata>,
    #[serde(default)]
    pub pdf_metadata: Option<PdfMetadata>,
    #[serde(default)]
    pub av_metadata: Option<AvMetadata>,
}

impl From<TypeMetadata> for TypeMetadataColumns {
    fn from(metadata: TypeMetadata) -> Self {
        let mut columns = TypeMetadataColumns::default();
        match metadata {
            TypeMetadata::None => {}
            TypeMetadata::Image(m) => columns.image_metadata = Some(m),
            TypeMetadata::Pdf(m) => columns.pdf_metadata = Some(m),
            TypeMetadata::Av(m) => columns.av_metadata = Some(m),
        }
        columns
    }
}

impl From<TypeMetadataColumns> for TypeMetadata {
    /// If storage somehow holds more than one map, the first of image, pdf, av wins.
    fn from(columns: TypeMetadataColumns) -> Self {
        if let Some(m) = columns.image_metadata {
            TypeMetadata::Image(m)
        } else if let Some(m) = columns.pdf_metadata {
            TypeMetadata::Pdf(m)
        } else if let Some(m) = columns.av_metadata {
            TypeMetadata::Av(m)
        } else {
            TypeMetadata::None
        }
    }
}

/// The one track-specific map a file part carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "TrackMetadataColumns", from = "TrackMetadataColumns")]
pub enum TrackMetadata {
    #[default]
    None,
    Audio(AudioMetadata),
    Video(VideoMetadata),
    Other(OtherMetadata),
}

impl TrackMetadata {
    pub fn audio(&self) -> Option<&AudioMetadata> {
        match self {
            TrackMetadata::Audio(m) => Some(m),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoMetadata> {
        match self {
            TrackMetadata::Video(m) => Some(m),
            _ => None,
        }
    }

    pub fn other(&self) -> Option<&OtherMetadata> {
        match self {
            TrackMetadata::Other(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadataColumns {
    #[serde(default)]
    pub audio_metadata: Option<AudioMetadata>,
    #[serde(default)]
    pub video_metadata: Option<VideoMetadata>,
    #[serde(default)]
    pub other_metadata: Option<OtherMetadata>,
}

impl From<TrackMetadata> for TrackMetadataColumns {
    fn from(metadata: TrackMetadata) -> Self {
        let mut columns = TrackMetadataColumns::default();
        match metadata {
            TrackMetadata::None => {}
            TrackMetadata::Audio(m) => columns.audio_metadata = Some(m),
            TrackMetadata::Video(m) => columns.video_metadata = Some(m),
            TrackMetadata::Other(m) => columns.other_metadata = Some(m),
        }
        columns
    }
}

impl From<TrackMetadataColumns> for TrackMetadata {
    fn from(columns: TrackMetadataColumns) -> Self {
        if let Some(m) = columns.audio_metadata {
            TrackMetadata::Audio(m)
        } else if let Some(m) = columns.video_metadata {
            TrackMetadata::Video(m)
        } else if let Some(m) = columns.other_metadata {
            TrackMetadata::Other(m)
        } else {
            TrackMetadata::None
        }
    }
}
