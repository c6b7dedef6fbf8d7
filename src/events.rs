use crate::error::{Result, VastError};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Name of a VAST tracking event.
///
/// The set is closed: names that are not listed here (or are not a
/// well-formed `progress-` offset) fail to parse instead of being tracked
/// blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventName {
    CreativeView,
    Start,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
    Mute,
    Unmute,
    Pause,
    Resume,
    Rewind,
    Skip,
    Fullscreen,
    ExitFullscreen,
    Expand,
    Collapse,
    PlayerExpand,
    PlayerCollapse,
    Minimize,
    Close,
    CloseLinear,
    AcceptInvitation,
    AcceptInvitationLinear,
    AdExpand,
    AdCollapse,
    OverlayViewDuration,
    OtherAdInteraction,
    NotUsed,
    Loaded,
    VerificationNotExecuted,
    /// `progress-<seconds>`, offset kept in milliseconds
    ProgressSeconds(u64),
    /// `progress-<percent>%`
    ProgressPercent(u32),
}

const NAMED_EVENTS: [(EventName, &str); 30] = [
    (EventName::CreativeView, "creativeView"),
    (EventName::Start, "start"),
    (EventName::FirstQuartile, "firstQuartile"),
    (EventName::Midpoint, "midpoint"),
    (EventName::ThirdQuartile, "thirdQuartile"),
    (EventName::Complete, "complete"),
    (EventName::Mute, "mute"),
    (EventName::Unmute, "unmute"),
    (EventName::Pause, "pause"),
    (EventName::Resume, "resume"),
    (EventName::Rewind, "rewind"),
    (EventName::Skip, "skip"),
    (EventName::Fullscreen, "fullscreen"),
    (EventName::ExitFullscreen, "exitFullscreen"),
    (EventName::Expand, "expand"),
    (EventName::Collapse, "collapse"),
    (EventName::PlayerExpand, "playerExpand"),
    (EventName::PlayerCollapse, "playerCollapse"),
    (EventName::Minimize, "minimize"),
    (EventName::Close, "close"),
    (EventName::CloseLinear, "closeLinear"),
    (EventName::AcceptInvitation, "acceptInvitation"),
    (EventName::AcceptInvitationLinear, "acceptInvitationLinear"),
    (EventName::AdExpand, "adExpand"),
    (EventName::AdCollapse, "adCollapse"),
    (EventName::OverlayViewDuration, "overlayViewDuration"),
    (EventName::OtherAdInteraction, "otherAdInteraction"),
    (EventName::NotUsed, "notUsed"),
    (EventName::Loaded, "loaded"),
    (EventName::VerificationNotExecuted, "verificationNotExecuted"),
];

const PROGRESS_PREFIX: &str = "progress-";

impl EventName {
    /// Events that may fire at most once per tracker
    pub fn is_fire_once(&self) -> bool {
        matches!(
            self,
            EventName::CreativeView
                | EventName::Start
                | EventName::FirstQuartile
                | EventName::Midpoint
                | EventName::ThirdQuartile
                | EventName::Complete
                | EventName::Skip
                | EventName::Close
                | EventName::CloseLinear
                | EventName::AcceptInvitation
                | EventName::AcceptInvitationLinear
                | EventName::NotUsed
                | EventName::Loaded
                | EventName::ProgressSeconds(_)
                | EventName::ProgressPercent(_)
        )
    }

    pub fn is_progress_marker(&self) -> bool {
        matches!(
            self,
            EventName::ProgressSeconds(_) | EventName::ProgressPercent(_)
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventName::ProgressSeconds(millis) => {
                if millis % 1000 == 0 {
                    write!(f, "{}{}", PROGRESS_PREFIX, millis / 1000)
                } else {
                    let fraction = format!("{:03}", millis % 1000);
                    write!(
                        f,
                        "{}{}.{}",
                        PROGRESS_PREFIX,
                        millis / 1000,
                        fraction.trim_end_matches('0')
                    )
                }
            }
            EventName::ProgressPercent(percent) => write!(f, "{}{}%", PROGRESS_PREFIX, percent),
            named => match NAMED_EVENTS.iter().find(|(event, _)| event == named) {
                Some((_, name)) => f.write_str(name),
                None => write!(f, "{:?}", named),
            },
        }
    }
}

impl FromStr for EventName {
    type Err = VastError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some((event, _)) = NAMED_EVENTS.iter().find(|(_, name)| *name == s) {
            return Ok(*event);
        }

        let unknown = || VastError::UnknownEvent(s.to_string());
        let offset = s.strip_prefix(PROGRESS_PREFIX).ok_or_else(unknown)?;

        if let Some(percent) = offset.strip_suffix('%') {
            let percent = percent.parse::<u32>().map_err(|_| unknown())?;
            return Ok(EventName::ProgressPercent(percent));
        }

        let seconds = offset.parse::<f64>().map_err(|_| unknown())?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(unknown());
        }
        Ok(EventName::ProgressSeconds((seconds * 1000.0).round() as u64))
    }
}

impl Serialize for EventName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Tracking URL templates keyed by event name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingEvents(BTreeMap<EventName, Vec<String>>);

impl TrackingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, event: EventName) -> Option<&Vec<String>> {
        self.0.get(&event)
    }

    pub fn contains(&self, event: EventName) -> bool {
        self.0.contains_key(&event)
    }

    /// Append a template to the list registered for `event`
    pub fn push(&mut self, event: EventName, url: impl Into<String>) {
        self.0.entry(event).or_default().push(url.into());
    }

    pub fn events(&self) -> impl Iterator<Item = &EventName> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(EventName, Vec<String>)> for TrackingEvents {
    fn from_iter<I: IntoIterator<Item = (EventName, Vec<String>)>>(iter: I) -> Self {
        TrackingEvents(iter.into_iter().collect())
    }
}

impl Serialize for TrackingEvents {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(event, urls)| (event.to_string(), urls)))
    }
}

impl<'de> Deserialize<'de> for TrackingEvents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, Vec<String>>::deserialize(deserializer)?;
        let mut events = TrackingEvents::new();
        for (name, urls) in raw {
            match name.parse::<EventName>() {
                Ok(event) => {
                    events.0.entry(event).or_default().extend(urls);
                }
                Err(_) => log::warn!("Skipping unsupported tracking event: {}", name),
            }
        }
        Ok(events)
    }
}

/// A notification emitted by the tracker.
///
/// Click-throughs carry the resolved URL, tracked events carry the templates
/// that were fired (or `None` when the creative does not track the event).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TrackerEvent {
    Tracked {
        event: EventName,
        #[serde(rename = "trackingURLTemplates")]
        tracking_url_templates: Option<Vec<String>>,
    },
    ClickThrough {
        url: String,
    },
    SkipCountdown {
        remaining: f64,
    },
    Error {
        message: String,
    },
}

impl TrackerEvent {
    /// The name the event is published under
    pub fn name(&self) -> String {
        match self {
            TrackerEvent::Tracked { event, .. } => event.to_string(),
            TrackerEvent::ClickThrough { .. } => "clickthrough".to_string(),
            TrackerEvent::SkipCountdown { .. } => "skip-countdown".to_string(),
            TrackerEvent::Error { .. } => "TRACKER-error".to_string(),
        }
    }
}

/// Receives tracker notifications synchronously, in firing order
pub trait Listener {
    fn notify(&mut self, event: &TrackerEvent);
}

impl<F> Listener for F
where
    F: FnMut(&TrackerEvent),
{
    fn notify(&mut self, event: &TrackerEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_events() {
        assert_eq!("firstQuartile".parse::<EventName>().unwrap(), EventName::FirstQuartile);
        assert_eq!("closeLinear".parse::<EventName>().unwrap(), EventName::CloseLinear);
        assert_eq!(EventName::OverlayViewDuration.to_string(), "overlayViewDuration");
    }

    #[test]
    fn parses_progress_offsets() {
        assert_eq!("progress-5".parse::<EventName>().unwrap(), EventName::ProgressSeconds(5000));
        assert_eq!("progress-2.5".parse::<EventName>().unwrap(), EventName::ProgressSeconds(2500));
        assert_eq!("progress-50%".parse::<EventName>().unwrap(), EventName::ProgressPercent(50));
        assert_eq!(EventName::ProgressSeconds(2500).to_string(), "progress-2.5");
        assert_eq!(EventName::ProgressSeconds(5000).to_string(), "progress-5");
        assert_eq!(EventName::ProgressPercent(10).to_string(), "progress-10%");
    }

    #[test]
    fn rejects_unknown_names() {
        for name in ["Start", "progress-", "progress-x%", "progress--1", "progress-inf", "bogus"] {
            assert!(matches!(
                name.parse::<EventName>(),
                Err(VastError::UnknownEvent(_))
            ), "{name} should not parse");
        }
    }

    #[test]
    fn deserialization_skips_unknown_events() {
        let json = r#"{"start": ["http://a"], "vendorSpecific": ["http://b"], "progress-10%": ["http://c"]}"#;
        let events: TrackingEvents = serde_json::from_str(json).unwrap();
        assert!(events.contains(EventName::Start));
        assert!(events.contains(EventName::ProgressPercent(10)));
        assert_eq!(events.events().count(), 2);
    }

    #[test]
    fn aliased_offsets_merge_in_key_order() {
        let json = r#"{"progress-5.0": ["http://b"], "progress-5": ["http://a"]}"#;
        let events: TrackingEvents = serde_json::from_str(json).unwrap();
        assert_eq!(
            events.get(EventName::ProgressSeconds(5000)),
            Some(&vec!["http://a".to_string(), "http://b".to_string()])
        );
    }

    #[test]
    fn emission_names() {
        let tracked = TrackerEvent::Tracked {
            event: EventName::ProgressPercent(50),
            tracking_url_templates: None,
        };
        assert_eq!(tracked.name(), "progress-50%");
        assert_eq!(TrackerEvent::ClickThrough { url: String::new() }.name(), "clickthrough");
        assert_eq!(TrackerEvent::SkipCountdown { remaining: 0.0 }.name(), "skip-countdown");
        assert_eq!(TrackerEvent::Error { message: String::new() }.name(), "TRACKER-error");
    }
}
