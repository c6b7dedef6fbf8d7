use crate::dispatcher::Dispatcher;
use crate::error::{Result, VastError};
use crate::events::{EventName, Listener, TrackerEvent};
use crate::macros::{self, ADPLAYHEAD, ERRORCODE, Macros, PlaybackContext, ResolvedMacros};
use crate::models::{Ad, Creative};
use crate::progress::{ProgressTracker, is_valid_time};
use crate::template;
use log::debug;
use std::collections::HashSet;

/// Duration reported by an overlay, either in seconds or already formatted
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayDuration {
    Seconds(f64),
    Formatted(String),
}

impl OverlayDuration {
    fn to_timecode(&self) -> String {
        match self {
            OverlayDuration::Seconds(seconds) => macros::format_timecode(*seconds),
            OverlayDuration::Formatted(formatted) => formatted.clone(),
        }
    }
}

impl From<f64> for OverlayDuration {
    fn from(seconds: f64) -> Self {
        OverlayDuration::Seconds(seconds)
    }
}

impl From<&str> for OverlayDuration {
    fn from(formatted: &str) -> Self {
        OverlayDuration::Formatted(formatted.to_string())
    }
}

impl From<String> for OverlayDuration {
    fn from(formatted: String) -> Self {
        OverlayDuration::Formatted(formatted)
    }
}

/// Tracks the playback of one creative of an ad.
///
/// Each method resolves macros, expands the matching URL templates, hands
/// the URLs to the dispatcher and notifies listeners before returning.
pub struct VastTracker<'a, D: Dispatcher> {
    ad: &'a Ad,
    creative: &'a Creative,
    dispatcher: D,
    listeners: Vec<Box<dyn Listener + 'a>>,
    progress: ProgressTracker,
    fired: HashSet<EventName>,
    impressed: bool,
    not_used: bool,
    muted: bool,
    paused: bool,
    fullscreen: bool,
    expanded: bool,
}

impl<'a, D: Dispatcher> VastTracker<'a, D> {
    pub fn new(ad: &'a Ad, creative: &'a Creative, dispatcher: D) -> Self {
        let skip_delay = creative.linear().and_then(|linear| linear.skip_delay);

        VastTracker {
            ad,
            creative,
            dispatcher,
            listeners: Vec::new(),
            progress: ProgressTracker::new(creative.duration(), skip_delay),
            fired: HashSet::new(),
            impressed: false,
            not_used: false,
            muted: false,
            paused: false,
            fullscreen: false,
            expanded: false,
        }
    }

    /// Start in the muted state, so that unmuting is tracked
    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    /// Register a listener for every notification this tracker emits
    pub fn subscribe(&mut self, listener: impl Listener + 'a) {
        self.listeners.push(Box::new(listener));
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn is_linear(&self) -> bool {
        self.creative.is_linear()
    }

    pub fn progress(&self) -> f64 {
        self.progress.progress()
    }

    pub fn asset_duration(&self) -> Option<f64> {
        self.progress.asset_duration()
    }

    pub fn last_percentage(&self) -> u32 {
        self.progress.last_percentage()
    }

    pub fn is_skippable(&self) -> bool {
        self.progress.is_skippable()
    }

    pub fn has_fired(&self, event: EventName) -> bool {
        self.fired.contains(&event)
    }

    /// Progress `HH:MM:SS.mmm` as used by `ADPLAYHEAD`
    pub fn progress_formatted(&self) -> String {
        macros::format_timecode(self.progress.progress())
    }

    pub fn set_duration(&mut self, duration: f64) {
        if !is_valid_time(duration) {
            self.emit_error(format!(
                "the duration provided is not valid. duration: {}",
                duration
            ));
            return;
        }
        self.progress.set_asset_duration(duration);
    }

    pub fn set_skip_delay(&mut self, delay: f64) {
        if !is_valid_time(delay) {
            self.emit_error(format!(
                "the skip delay provided is not valid. skipDelay: {}",
                delay
            ));
            return;
        }
        self.progress.set_skip_delay(delay);
    }

    /// Update the playhead and track every marker that became due
    pub fn set_progress(&mut self, progress: f64, overrides: &Macros) {
        if self.not_used {
            return;
        }
        if !is_valid_time(progress) {
            self.emit_error(format!(
                "the progress provided is not valid. progress: {}",
                progress
            ));
            return;
        }

        let creative = self.creative;
        let registered = creative
            .tracking_events
            .events()
            .filter(|event| event.is_progress_marker());
        let update = self.progress.advance(progress, registered, &self.fired);

        if let Some(remaining) = update.skip_countdown {
            self.emit(TrackerEvent::SkipCountdown { remaining });
        }

        let mut marker_macros = overrides.clone();
        if self.is_linear() {
            marker_macros
                .entry(ADPLAYHEAD.to_string())
                .or_insert_with(|| macros::format_timecode(progress));
        }
        for event in update.due {
            self.track(event, &marker_macros);
        }

        if update.rewound {
            self.track(EventName::Rewind, overrides);
        }
    }

    pub fn set_muted(&mut self, muted: bool, overrides: &Macros) {
        if self.muted != muted {
            let event = if muted { EventName::Mute } else { EventName::Unmute };
            self.track(event, overrides);
        }
        self.muted = muted;
    }

    pub fn set_paused(&mut self, paused: bool, overrides: &Macros) {
        if self.paused != paused {
            let event = if paused { EventName::Pause } else { EventName::Resume };
            self.track(event, overrides);
        }
        self.paused = paused;
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool, overrides: &Macros) {
        if self.fullscreen != fullscreen {
            let event = if fullscreen {
                EventName::Fullscreen
            } else {
                EventName::ExitFullscreen
            };
            self.track(event, overrides);
        }
        self.fullscreen = fullscreen;
    }

    pub fn set_expand(&mut self, expanded: bool, overrides: &Macros) {
        if self.expanded != expanded {
            if expanded {
                self.track(EventName::Expand, overrides);
                self.track(EventName::PlayerExpand, overrides);
            } else {
                self.track(EventName::Collapse, overrides);
                self.track(EventName::PlayerCollapse, overrides);
            }
        }
        self.expanded = expanded;
    }

    /// Fire the impression pixels and track `creativeView`, once
    pub fn track_impression(&mut self, overrides: &Macros) {
        if self.impressed {
            return;
        }
        self.impressed = true;

        let ad = self.ad;
        self.fire(&ad.impression_url_templates, overrides, false);
        self.track(EventName::CreativeView, overrides);
    }

    /// Fire the ad error pixels
    pub fn error(&mut self, overrides: &Macros, custom_error_code: bool) {
        let ad = self.ad;
        self.fire(&ad.error_url_templates, overrides, custom_error_code);
    }

    pub fn error_with_code(&mut self, code: &str, custom_error_code: bool) {
        let mut overrides = Macros::new();
        overrides.insert(ERRORCODE.to_string(), code.to_string());
        self.error(&overrides, custom_error_code);
    }

    pub fn complete(&mut self, overrides: &Macros) {
        self.track(EventName::Complete, overrides);
    }

    /// Track `closeLinear` for linear creatives, `close` otherwise
    pub fn close(&mut self, overrides: &Macros) {
        let event = if self.is_linear() {
            EventName::CloseLinear
        } else {
            EventName::Close
        };
        self.track(event, overrides);
    }

    pub fn skip(&mut self, overrides: &Macros) {
        self.track(EventName::Skip, overrides);
    }

    pub fn load(&mut self, overrides: &Macros) {
        self.track(EventName::Loaded, overrides);
    }

    pub fn rewind(&mut self, overrides: &Macros) {
        self.track(EventName::Rewind, overrides);
    }

    pub fn minimize(&mut self, overrides: &Macros) {
        self.track(EventName::Minimize, overrides);
    }

    pub fn accept_invitation(&mut self, overrides: &Macros) {
        self.track(EventName::AcceptInvitation, overrides);
    }

    pub fn ad_expand(&mut self, overrides: &Macros) {
        self.track(EventName::AdExpand, overrides);
    }

    pub fn ad_collapse(&mut self, overrides: &Macros) {
        self.track(EventName::AdCollapse, overrides);
    }

    pub fn other_ad_interaction(&mut self, overrides: &Macros) {
        self.track(EventName::OtherAdInteraction, overrides);
    }

    /// Track `notUsed`; the tracker ignores every later event
    pub fn not_used(&mut self, overrides: &Macros) {
        self.track(EventName::NotUsed, overrides);
        self.not_used = true;
    }

    /// Track how long an overlay was shown, reported as `ADPLAYHEAD`
    pub fn overlay_view_duration(
        &mut self,
        duration: impl Into<OverlayDuration>,
        overrides: &Macros,
    ) {
        let mut overrides = overrides.clone();
        overrides.insert(ADPLAYHEAD.to_string(), duration.into().to_timecode());
        self.track(EventName::OverlayViewDuration, &overrides);
    }

    /// Report that the verification script of `vendor` was not executed
    pub fn verification_not_executed(&mut self, vendor: &str, overrides: &Macros) -> Result<()> {
        let ad = self.ad;
        if ad.ad_verifications.is_empty() {
            return Err(VastError::NoAdVerifications);
        }
        if vendor.is_empty() {
            return Err(VastError::MissingVendor);
        }

        let verification = ad
            .ad_verifications
            .iter()
            .find(|verification| verification.vendor.as_deref() == Some(vendor))
            .ok_or_else(|| VastError::VendorNotFound(vendor.to_string()))?;

        let templates = verification
            .tracking_events
            .get(EventName::VerificationNotExecuted);
        if let Some(templates) = templates {
            self.fire(templates, overrides, false);
        }
        self.emit(TrackerEvent::Tracked {
            event: EventName::VerificationNotExecuted,
            tracking_url_templates: templates.cloned(),
        });

        Ok(())
    }

    /// Fire the click tracking pixels and publish the click-through URL.
    ///
    /// `fallback_click_through` is used when the creative has no
    /// click-through of its own.
    pub fn click(&mut self, fallback_click_through: Option<&str>, overrides: &Macros) {
        let creative = self.creative;
        let macros = self.resolve(overrides, false);

        let click_tracking = creative.click_tracking();
        if !click_tracking.is_empty() {
            self.dispatch(template::expand(click_tracking, &macros));
        }

        if let Some(click_through) = creative.click_through().or(fallback_click_through) {
            let url = template::expand_one(click_through, &macros);
            self.emit(TrackerEvent::ClickThrough { url });
        }
    }

    /// Track `event` with the creative's templates for it.
    ///
    /// Fire-once events that already fired are ignored. Events the creative
    /// does not track are still published, without templates.
    pub fn track(&mut self, event: EventName, overrides: &Macros) {
        if self.not_used {
            debug!("Ignoring {} after notUsed", event);
            return;
        }

        let tracking_events = &self.creative.tracking_events;
        let event = if event == EventName::CloseLinear
            && !tracking_events.contains(EventName::CloseLinear)
            && tracking_events.contains(EventName::Close)
        {
            EventName::Close
        } else {
            event
        };

        if event.is_fire_once() && !self.fired.insert(event) {
            debug!("Ignoring {}, already tracked", event);
            return;
        }

        let creative = self.creative;
        let templates = creative.tracking_events.get(event);
        if let Some(templates) = templates {
            self.fire(templates, overrides, false);
        }
        self.emit(TrackerEvent::Tracked {
            event,
            tracking_url_templates: templates.cloned(),
        });
    }

    fn resolve(&self, overrides: &Macros, custom_error_code: bool) -> ResolvedMacros {
        let context = PlaybackContext {
            progress: self.progress.progress(),
            custom_error_code,
        };
        macros::resolve_macros(&context, self.ad, self.creative, overrides)
    }

    fn fire(&self, templates: &[String], overrides: &Macros, custom_error_code: bool) {
        if templates.is_empty() {
            return;
        }
        let macros = self.resolve(overrides, custom_error_code);
        self.dispatch(template::expand(templates, &macros));
    }

    fn dispatch(&self, urls: Vec<String>) {
        if urls.is_empty() {
            return;
        }
        for url in &urls {
            debug!("Firing tracking URL: {}", url);
        }
        self.dispatcher.fire(&urls);
    }

    fn emit(&mut self, event: TrackerEvent) {
        debug!("Emitting {}", event.name());
        for listener in &mut self.listeners {
            listener.notify(&event);
        }
    }

    fn emit_error(&mut self, message: String) {
        self.emit(TrackerEvent::Error { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TrackingEvents;
    use crate::models::{CreativeKind, Linear, NonLinear, VideoClicks};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl Dispatcher for Recorder {
        fn fire(&self, urls: &[String]) {
            self.calls.borrow_mut().push(urls.to_vec());
        }
    }

    fn creative(kind: CreativeKind, events: &[(EventName, &str)]) -> Creative {
        let mut tracking_events = TrackingEvents::new();
        for (event, url) in events {
            tracking_events.push(*event, *url);
        }
        Creative {
            id: None,
            ad_id: None,
            sequence: None,
            tracking_events,
            kind,
        }
    }

    fn linear(duration: f64) -> CreativeKind {
        CreativeKind::Linear(Linear {
            duration,
            ..Linear::default()
        })
    }

    fn recorded(tracker: &mut VastTracker<'_, &Recorder>) -> Rc<RefCell<Vec<TrackerEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        tracker.subscribe(move |event: &TrackerEvent| sink.borrow_mut().push(event.clone()));
        events
    }

    #[test]
    fn close_falls_back_to_close_templates() {
        let ad = Ad::default();
        let creative = creative(linear(10.0), &[(EventName::Close, "http://t/close")]);
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);
        let events = recorded(&mut tracker);

        tracker.close(&Macros::new());
        tracker.close(&Macros::new());

        assert_eq!(*recorder.calls.borrow(), vec![vec!["http://t/close".to_string()]]);
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(events.borrow()[0].name(), "close");
    }

    #[test]
    fn toggles_track_changes_only() {
        let ad = Ad::default();
        let creative = creative(
            linear(10.0),
            &[(EventName::Mute, "http://t/mute"), (EventName::Unmute, "http://t/unmute")],
        );
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);

        tracker.set_muted(true, &Macros::new());
        tracker.set_muted(true, &Macros::new());
        tracker.set_muted(false, &Macros::new());
        tracker.set_muted(true, &Macros::new());

        assert_eq!(
            *recorder.calls.borrow(),
            vec![
                vec!["http://t/mute".to_string()],
                vec!["http://t/unmute".to_string()],
                vec!["http://t/mute".to_string()],
            ]
        );
    }

    #[test]
    fn expand_tracks_both_events() {
        let ad = Ad::default();
        let creative = creative(linear(10.0), &[]);
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);
        let events = recorded(&mut tracker);

        tracker.set_expand(true, &Macros::new());
        tracker.set_expand(false, &Macros::new());

        let names: Vec<String> = events.borrow().iter().map(TrackerEvent::name).collect();
        assert_eq!(names, vec!["expand", "playerExpand", "collapse", "playerCollapse"]);
        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn invalid_values_emit_tracker_errors() {
        let ad = Ad::default();
        let creative = creative(linear(10.0), &[]);
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);
        let events = recorded(&mut tracker);

        tracker.set_duration(-1.0);
        tracker.set_progress(f64::NAN, &Macros::new());

        assert_eq!(tracker.asset_duration(), Some(10.0));
        assert_eq!(tracker.progress(), 0.0);
        assert_eq!(
            *events.borrow(),
            vec![
                TrackerEvent::Error {
                    message: "the duration provided is not valid. duration: -1".to_string()
                },
                TrackerEvent::Error {
                    message: "the progress provided is not valid. progress: NaN".to_string()
                },
            ]
        );
    }

    #[test]
    fn non_linear_uses_its_own_clicks_and_close() {
        let ad = Ad::default();
        let creative = creative(
            CreativeKind::NonLinear(NonLinear {
                min_suggested_duration: Some(8.0),
                click_through: Some("http://t/nl-ct?ph=[ADPLAYHEAD]".to_string()),
                click_tracking: vec!["http://t/nl-click".to_string()],
                ..NonLinear::default()
            }),
            &[(EventName::Close, "http://t/close")],
        );
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);
        let events = recorded(&mut tracker);

        tracker.set_progress(4.0, &Macros::new());
        tracker.click(None, &Macros::new());
        tracker.close(&Macros::new());

        assert_eq!(tracker.asset_duration(), Some(8.0));
        assert!(tracker.has_fired(EventName::Midpoint));
        assert!(
            events
                .borrow()
                .contains(&TrackerEvent::ClickThrough { url: "http://t/nl-ct?ph=".to_string() })
        );
        let calls = recorder.calls.borrow();
        assert!(calls.contains(&vec!["http://t/nl-click".to_string()]));
        assert!(calls.contains(&vec!["http://t/close".to_string()]));
    }

    #[test]
    fn non_linear_markers_carry_no_playhead() {
        let ad = Ad::default();
        let creative = creative(
            CreativeKind::NonLinear(NonLinear {
                min_suggested_duration: Some(8.0),
                ..NonLinear::default()
            }),
            &[
                (EventName::Midpoint, "http://t/mid?ph=[ADPLAYHEAD]"),
                (EventName::Minimize, "http://t/min?ph=[ADPLAYHEAD]"),
            ],
        );
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);

        tracker.set_progress(4.0, &Macros::new());
        tracker.minimize(&Macros::new());

        assert_eq!(
            *recorder.calls.borrow(),
            vec![
                vec!["http://t/mid?ph=".to_string()],
                vec!["http://t/min?ph=".to_string()],
            ]
        );
    }

    #[test]
    fn linear_markers_carry_the_new_playhead() {
        let ad = Ad::default();
        let creative = creative(linear(8.0), &[(EventName::Midpoint, "http://t/mid?ph=[ADPLAYHEAD]")]);
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);

        tracker.set_progress(4.0, &Macros::new());

        assert_eq!(
            *recorder.calls.borrow(),
            vec![vec!["http://t/mid?ph=00%3A00%3A04.000".to_string()]]
        );
    }

    #[test]
    fn click_uses_fallback_click_through() {
        let ad = Ad::default();
        let creative = creative(
            CreativeKind::Linear(Linear {
                duration: 10.0,
                video_clicks: VideoClicks::default(),
                ..Linear::default()
            }),
            &[],
        );
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);
        let events = recorded(&mut tracker);

        tracker.click(None, &Macros::new());
        assert!(events.borrow().is_empty());

        tracker.click(Some("http://fallback/[PODSEQUENCE]"), &Macros::new());
        assert_eq!(
            *events.borrow(),
            vec![TrackerEvent::ClickThrough { url: "http://fallback/".to_string() }]
        );
        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn overlay_duration_in_seconds_is_formatted() {
        let ad = Ad::default();
        let creative = creative(
            linear(10.0),
            &[(EventName::OverlayViewDuration, "http://t/overlay?d=[ADPLAYHEAD]")],
        );
        let recorder = Recorder::default();
        let mut tracker = VastTracker::new(&ad, &creative, &recorder);

        tracker.overlay_view_duration(30.5, &Macros::new());
        tracker.overlay_view_duration(30.5, &Macros::new());

        let expected = "http://t/overlay?d=00%3A00%3A30.500".to_string();
        assert_eq!(*recorder.calls.borrow(), vec![vec![expected.clone()], vec![expected]]);
    }
}
