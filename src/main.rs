use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

// Import the library
use vast_tracker::macros::{self, Macros, ResolvedMacros};
use vast_tracker::{
    Ad, Creative, Dispatcher, HttpDispatcher, LogDispatcher, TrackerEvent, VastError, VastTracker,
    template,
};

/// VAST playback tracker
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the first creative of an ad and fire its tracking pixels
    Simulate {
        /// Path to the ad JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Seconds between progress updates
        #[arg(short, long, default_value_t = 1.0)]
        step: f64,

        /// Stop playback after this many seconds (defaults to the creative duration)
        #[arg(short, long)]
        until: Option<f64>,

        /// Log the tracking URLs instead of requesting them
        #[arg(long)]
        dry_run: bool,

        /// Macro override as KEY=VALUE (repeatable)
        #[arg(short, long = "macro", value_parser = parse_macro)]
        macros: Vec<(String, String)>,
    },

    /// Expand URL templates with the given macros
    Expand {
        /// URL template (repeatable)
        #[arg(short, long, required = true)]
        template: Vec<String>,

        /// Macro value as KEY=VALUE (repeatable)
        #[arg(short, long = "macro", value_parser = parse_macro)]
        macros: Vec<(String, String)>,
    },

    /// Format seconds the way ADPLAYHEAD is reported
    Timecode {
        /// Time in seconds
        seconds: f64,
    },
}

fn parse_macro(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("invalid macro `{}`, expected KEY=VALUE", value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            input,
            step,
            until,
            dry_run,
            macros,
        } => {
            check_playback(step, until)?;

            let ad = Ad::load(&input)?;
            let creative = ad
                .creatives
                .first()
                .ok_or_else(|| VastError::Other("The ad has no creatives".to_string()))?;
            let overrides: Macros = macros.into_iter().collect();

            if dry_run {
                simulate(&ad, creative, LogDispatcher, step, until, &overrides);
            } else {
                let dispatcher = HttpDispatcher::new()?;
                simulate(&ad, creative, &dispatcher, step, until, &overrides);

                // Let the in-flight pixels finish before exiting
                dispatcher.drain().await;
            }
        }
        Commands::Expand {
            template: templates,
            macros,
        } => {
            let resolved = ResolvedMacros::encode(macros.into_iter().collect());
            for url in template::expand(&templates, &resolved) {
                println!("{}", url);
            }
        }
        Commands::Timecode { seconds } => {
            println!("{}", macros::format_timecode(seconds));
        }
    }

    Ok(())
}

/// Reject steps and end positions the simulation loop cannot terminate on
fn check_playback(step: f64, until: Option<f64>) -> Result<(), VastError> {
    if !(step.is_finite() && step > 0.0) {
        return Err(VastError::Other(format!("Invalid step: {}", step)));
    }
    if let Some(until) = until {
        if !(until.is_finite() && until >= 0.0) {
            return Err(VastError::Other(format!("Invalid end position: {}", until)));
        }
    }
    Ok(())
}

/// Drive a tracker from impression to the end of playback
fn simulate<D: Dispatcher>(
    ad: &Ad,
    creative: &Creative,
    dispatcher: D,
    step: f64,
    until: Option<f64>,
    overrides: &Macros,
) {
    let mut tracker = VastTracker::new(ad, creative, dispatcher);
    tracker.subscribe(|event: &TrackerEvent| match serde_json::to_string(event) {
        Ok(json) => println!("{} {}", event.name(), json),
        Err(e) => warn!("Failed to encode {}: {}", event.name(), e),
    });

    let end = until.or(tracker.asset_duration()).unwrap_or(0.0);
    info!("Simulating {:.3}s of playback", end);

    tracker.track_impression(overrides);
    for tick in 1u64.. {
        let position = (tick as f64 * step).min(end);
        tracker.set_progress(position, overrides);
        if position >= end {
            break;
        }
    }

    if tracker.asset_duration().is_some_and(|duration| end >= duration) {
        tracker.complete(overrides);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_bounds_must_be_finite() {
        assert!(check_playback(0.25, None).is_ok());
        assert!(check_playback(1.0, Some(0.0)).is_ok());

        assert!(check_playback(0.0, None).is_err());
        assert!(check_playback(f64::NAN, Some(10.0)).is_err());
        assert!(check_playback(1.0, Some(f64::NAN)).is_err());
        assert!(check_playback(1.0, Some(f64::INFINITY)).is_err());
        assert!(check_playback(1.0, Some(-1.0)).is_err());
    }
}
