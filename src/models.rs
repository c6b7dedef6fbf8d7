use crate::error::Result;
use crate::events::TrackingEvents;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Represents an Ad as produced by a VAST parser
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct Ad {
    /// The ad ID
    pub id: Option<String>,

    /// The ad sequence number (for ad pods)
    pub sequence: Option<u32>,

    /// The ad serving ID (VAST 4.1+)
    pub ad_serving_id: Option<String>,

    /// The ad type (e.g., "video", "audio", "hybrid")
    pub ad_type: Option<String>,

    /// Category labels
    pub categories: Vec<String>,

    /// Blocked category labels
    pub blocked_ad_categories: Vec<String>,

    /// The universal ad ID
    pub universal_ad_id: Option<UniversalAdId>,

    /// Impression tracking URL templates
    pub impression_url_templates: Vec<String>,

    /// Error tracking URL templates
    pub error_url_templates: Vec<String>,

    /// Third-party verification entries
    pub ad_verifications: Vec<Verification>,

    /// Creative elements
    pub creatives: Vec<Creative>,
}

impl Ad {
    /// Decode an ad from its JSON representation
    pub fn from_json(json: &str) -> Result<Ad> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and decode an ad from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Ad> {
        let content = fs::read_to_string(path)?;
        Ad::from_json(&content)
    }
}

/// Represents the universal ad ID of an ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UniversalAdId {
    /// The registry the ID belongs to
    pub id_registry: String,

    /// The ID value
    pub value: String,
}

/// Represents a verification entry of a measurement vendor
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct Verification {
    /// The vendor name (e.g., "company.com-omid")
    pub vendor: Option<String>,

    /// The verification script URL
    pub resource: Option<String>,

    /// The verification API framework
    pub api_framework: Option<String>,

    /// Verification parameters
    pub parameters: Option<String>,

    /// Vendor tracking events
    pub tracking_events: TrackingEvents,
}

/// Represents a creative element
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Creative {
    /// The creative ID
    #[serde(default)]
    pub id: Option<String>,

    /// The creative ad ID
    #[serde(default)]
    pub ad_id: Option<String>,

    /// The creative sequence number
    #[serde(default)]
    pub sequence: Option<u32>,

    /// Tracking URL templates keyed by event
    #[serde(default)]
    pub tracking_events: TrackingEvents,

    /// Linear or non-linear details
    pub kind: CreativeKind,
}

/// The creative variant
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CreativeKind {
    Linear(Linear),
    NonLinear(NonLinear),
}

impl Creative {
    pub fn is_linear(&self) -> bool {
        matches!(self.kind, CreativeKind::Linear(_))
    }

    pub fn linear(&self) -> Option<&Linear> {
        match &self.kind {
            CreativeKind::Linear(linear) => Some(linear),
            CreativeKind::NonLinear(_) => None,
        }
    }

    /// The URL of the first media file of a linear creative
    pub fn asset_uri(&self) -> Option<&str> {
        self.linear()
            .and_then(|linear| linear.media_files.first())
            .map(|media_file| media_file.url.as_str())
            .filter(|url| !url.is_empty())
    }

    /// The duration the progress markers are computed against
    pub fn duration(&self) -> Option<f64> {
        match &self.kind {
            CreativeKind::Linear(linear) => Some(linear.duration),
            CreativeKind::NonLinear(non_linear) => non_linear.min_suggested_duration,
        }
    }

    pub fn click_through(&self) -> Option<&str> {
        match &self.kind {
            CreativeKind::Linear(linear) => linear.video_clicks.click_through.as_deref(),
            CreativeKind::NonLinear(non_linear) => non_linear.click_through.as_deref(),
        }
    }

    pub fn click_tracking(&self) -> &[String] {
        match &self.kind {
            CreativeKind::Linear(linear) => &linear.video_clicks.click_tracking,
            CreativeKind::NonLinear(non_linear) => &non_linear.click_tracking,
        }
    }
}

/// Represents a linear ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct Linear {
    /// The duration of the ad in seconds
    pub duration: f64,

    /// Seconds before the ad may be skipped
    pub skip_delay: Option<f64>,

    /// Media files
    pub media_files: Vec<MediaFile>,

    /// Video clicks
    pub video_clicks: VideoClicks,

    /// Ad parameters passed to the media
    pub ad_parameters: Option<String>,

    /// Industry icons
    pub icons: Vec<Icon>,
}

/// Represents a media file
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct MediaFile {
    /// The media file URL
    pub url: String,

    /// The media file MIME type
    pub mime_type: String,

    /// The media file codec
    pub codec: Option<String>,

    /// The media file bitrate
    pub bitrate: Option<u32>,

    /// The media file width
    pub width: Option<u32>,

    /// The media file height
    pub height: Option<u32>,

    /// The media file delivery type (progressive or streaming)
    pub delivery: Option<String>,
}

/// Represents video click-through and click-tracking URL templates
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct VideoClicks {
    /// The click-through URL template
    pub click_through: Option<String>,

    /// Click tracking URL templates
    pub click_tracking: Vec<String>,

    /// Custom click URL templates
    pub custom_click: Vec<String>,
}

/// Represents an industry icon shown over a linear ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct Icon {
    /// The icon program (e.g., "AdChoices")
    pub program: Option<String>,

    pub width: Option<u32>,

    pub height: Option<u32>,

    /// The icon resource URL
    pub resource: Option<String>,

    /// The icon click-through URL template
    pub click_through: Option<String>,

    /// Icon click tracking URL templates
    pub click_tracking: Vec<String>,

    /// Icon view tracking URL templates
    pub view_tracking: Vec<String>,
}

/// Represents a non-linear ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct NonLinear {
    /// The non-linear ID
    pub id: Option<String>,

    /// Minimum time the ad should be shown, in seconds
    pub min_suggested_duration: Option<f64>,

    /// The non-linear click-through URL template
    pub click_through: Option<String>,

    /// Non-linear click tracking URL templates
    pub click_tracking: Vec<String>,
}
