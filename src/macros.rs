//! Macro resolution for tracking URL templates.
//!
//! Every tracked event gets a fresh set of macros built from the ad, the
//! creative, the playback state and the caller's overrides. Overrides are
//! raw values: they win over computed values and are percent-encoded
//! together with them, exactly once. Callers must not pre-encode them.

use crate::models::{Ad, Creative};
use chrono::{SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::{Rng, thread_rng};
use std::collections::BTreeMap;

/// Raw macro values keyed by macro name
pub type Macros = BTreeMap<String, String>;

pub const ASSETURI: &str = "ASSETURI";
pub const UNIVERSALADID: &str = "UNIVERSALADID";
pub const PODSEQUENCE: &str = "PODSEQUENCE";
pub const ADSERVINGID: &str = "ADSERVINGID";
pub const ADTYPE: &str = "ADTYPE";
pub const ADCATEGORIES: &str = "ADCATEGORIES";
pub const BLOCKEDADCATEGORIES: &str = "BLOCKEDADCATEGORIES";
pub const ADPLAYHEAD: &str = "ADPLAYHEAD";
pub const CONTENTPLAYHEAD: &str = "CONTENTPLAYHEAD";
pub const CACHEBUSTING: &str = "CACHEBUSTING";
pub const RANDOM: &str = "RANDOM";
pub const TIMESTAMP: &str = "TIMESTAMP";
pub const ERRORCODE: &str = "ERRORCODE";
pub const REASON: &str = "REASON";

/// Error code reported when the caller supplies a malformed one
const UNDEFINED_ERROR_CODE: &str = "900";

/// RFC 3986 unreserved characters are the only ones left unescaped
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Playback state the dynamic macros are computed from
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackContext {
    /// Seconds into playback
    pub progress: f64,

    /// Keep a non-VAST `ERRORCODE` instead of replacing it with 900
    pub custom_error_code: bool,
}

/// Percent-encoded macro values, ready for substitution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedMacros(BTreeMap<String, String>);

impl ResolvedMacros {
    /// Encode raw values as they are, without computing any defaults
    pub fn encode(raw: Macros) -> Self {
        ResolvedMacros(
            raw.into_iter()
                .map(|(name, value)| (name, encode(&value)))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Percent-encode a URL component
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Format seconds as `HH:MM:SS.mmm`.
///
/// Milliseconds are rounded; hours are not wrapped and grow past two digits.
pub fn format_timecode(seconds: f64) -> String {
    let total_millis = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };

    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let secs = (total_millis / 1000) % 60;
    let millis = total_millis % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

/// Raw default macros computed from the ad, the creative and the playback state
pub fn default_macros(context: &PlaybackContext, ad: &Ad, creative: &Creative) -> Macros {
    let mut macros = Macros::new();

    if creative.is_linear() {
        if let Some(asset_uri) = creative.asset_uri() {
            macros.insert(ASSETURI.to_string(), asset_uri.to_string());
        }
        if context.progress > 0.0 {
            macros.insert(ADPLAYHEAD.to_string(), format_timecode(context.progress));
        }
    }

    if let Some(universal_ad_id) = &ad.universal_ad_id {
        if !universal_ad_id.id_registry.is_empty() && !universal_ad_id.value.is_empty() {
            macros.insert(
                UNIVERSALADID.to_string(),
                format!("{} {}", universal_ad_id.id_registry, universal_ad_id.value),
            );
        }
    }
    if let Some(sequence) = ad.sequence {
        macros.insert(PODSEQUENCE.to_string(), sequence.to_string());
    }
    if let Some(ad_serving_id) = &ad.ad_serving_id {
        macros.insert(ADSERVINGID.to_string(), ad_serving_id.clone());
    }
    if let Some(ad_type) = &ad.ad_type {
        macros.insert(ADTYPE.to_string(), ad_type.clone());
    }
    if !ad.categories.is_empty() {
        macros.insert(ADCATEGORIES.to_string(), ad.categories.join(","));
    }
    if !ad.blocked_ad_categories.is_empty() {
        macros.insert(
            BLOCKEDADCATEGORIES.to_string(),
            ad.blocked_ad_categories.join(","),
        );
    }

    let cache_buster = format!("{:08}", thread_rng().gen_range(0..100_000_000u32));
    macros.insert(RANDOM.to_string(), cache_buster.clone());
    macros.insert("random".to_string(), cache_buster.clone());
    macros.insert(CACHEBUSTING.to_string(), cache_buster);
    macros.insert(
        TIMESTAMP.to_string(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    );

    macros
}

/// Build the full, encoded macro set for one tracked event
pub fn resolve_macros(
    context: &PlaybackContext,
    ad: &Ad,
    creative: &Creative,
    overrides: &Macros,
) -> ResolvedMacros {
    let mut macros = default_macros(context, ad, creative);
    macros.extend(overrides.iter().map(|(name, value)| (name.clone(), value.clone())));

    if !context.custom_error_code {
        if let Some(code) = macros.get_mut(ERRORCODE) {
            if !is_vast_error_code(code) {
                *code = UNDEFINED_ERROR_CODE.to_string();
            }
        }
    }

    ResolvedMacros::encode(macros)
}

fn is_vast_error_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit())
}
