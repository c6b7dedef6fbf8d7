use crate::events::EventName;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Quartile markers and the percentage they are reached at
const QUARTILES: [(u32, EventName); 4] = [
    (25, EventName::FirstQuartile),
    (50, EventName::Midpoint),
    (75, EventName::ThirdQuartile),
    (100, EventName::Complete),
];

/// Whether `value` is usable as a time in seconds
pub fn is_valid_time(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Outcome of a playhead update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Markers that became due, in firing order
    pub due: Vec<EventName>,

    /// The playhead moved backwards
    pub rewound: bool,

    /// Seconds left before the ad can be skipped, when a countdown applies
    pub skip_countdown: Option<f64>,
}

/// Playhead bookkeeping for one creative.
///
/// The tracker owns the fired set; this type only decides what is due.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressTracker {
    asset_duration: Option<f64>,
    progress: f64,
    last_percentage: u32,
    skip_delay: Option<f64>,
    skippable: bool,
}

impl ProgressTracker {
    pub fn new(asset_duration: Option<f64>, skip_delay: Option<f64>) -> Self {
        ProgressTracker {
            asset_duration: asset_duration.filter(|d| is_valid_time(*d)),
            skip_delay: skip_delay.filter(|d| is_valid_time(*d)),
            ..ProgressTracker::default()
        }
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn asset_duration(&self) -> Option<f64> {
        self.asset_duration
    }

    pub fn last_percentage(&self) -> u32 {
        self.last_percentage
    }

    pub fn skip_delay(&self) -> Option<f64> {
        self.skip_delay
    }

    pub fn is_skippable(&self) -> bool {
        self.skippable
    }

    pub fn set_asset_duration(&mut self, duration: f64) {
        self.asset_duration = Some(duration);
    }

    pub fn set_skip_delay(&mut self, delay: f64) {
        self.skip_delay = Some(delay);
    }

    /// Move the playhead to `progress` seconds.
    ///
    /// `registered` are the `progress-` markers the creative tracks; markers
    /// in `fired` are never returned again, whichever way the playhead moved.
    pub fn advance<'e>(
        &mut self,
        progress: f64,
        registered: impl IntoIterator<Item = &'e EventName>,
        fired: &HashSet<EventName>,
    ) -> ProgressUpdate {
        let mut update = ProgressUpdate {
            rewound: progress < self.progress,
            skip_countdown: self.skip_countdown(progress),
            ..ProgressUpdate::default()
        };

        let duration = self.asset_duration.filter(|d| *d > 0.0);
        let percentage = duration.map(|d| (100.0 * progress / d).round() as u32);

        // (threshold in seconds, kind rank, marker)
        let mut candidates: Vec<(f64, u8, EventName)> = Vec::new();

        if progress > 0.0 {
            if let (Some(duration), Some(percentage)) = (duration, percentage) {
                candidates.push((0.0, 0, EventName::Start));
                for (quartile, event) in QUARTILES {
                    let threshold = duration * f64::from(quartile) / 100.0;
                    if progress >= threshold {
                        candidates.push((threshold, 1, event));
                    }
                }
            }

            for event in registered {
                match *event {
                    EventName::ProgressPercent(percent) => {
                        if let (Some(duration), Some(percentage)) = (duration, percentage) {
                            if percentage >= percent {
                                candidates.push((duration * f64::from(percent) / 100.0, 2, *event));
                            }
                        }
                    }
                    EventName::ProgressSeconds(millis) => {
                        let offset = millis as f64 / 1000.0;
                        if progress >= offset {
                            candidates.push((offset, 3, *event));
                        }
                    }
                    _ => (),
                }
            }
        }

        candidates.retain(|(_, _, event)| !fired.contains(event));
        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });
        candidates.dedup_by(|a, b| a.2 == b.2);
        update.due = candidates.into_iter().map(|(_, _, event)| event).collect();

        if let Some(percentage) = percentage {
            self.last_percentage = percentage;
        }
        self.progress = progress;

        update
    }

    fn skip_countdown(&mut self, progress: f64) -> Option<f64> {
        let delay = self.skip_delay?;
        if self.skippable {
            return None;
        }
        if delay > progress {
            Some(delay - progress)
        } else {
            self.skippable = true;
            Some(0.0)
        }
    }
}
