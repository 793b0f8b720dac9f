use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transcode::TranscodeOp;

/// `aecho` parameters. Gains and decay are fractions, delay is milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EchoParams {
    pub in_gain: f64,
    pub out_gain: f64,
    pub delay_ms: f64,
    pub decay: f64,
}

impl EchoParams {
    pub const ECHO: Self = Self {
        in_gain: 0.8,
        out_gain: 0.9,
        delay_ms: 1000.0,
        decay: 0.3,
    };

    /// Short dense reflections, the only reverb the engine offers.
    pub const REVERB: Self = Self {
        in_gain: 0.8,
        out_gain: 0.88,
        delay_ms: 60.0,
        decay: 0.4,
    };

    const MAX_DELAY_MS: f64 = 90_000.0;

    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("in_gain", self.in_gain),
            ("out_gain", self.out_gain),
            ("decay", self.decay),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if !self.delay_ms.is_finite() || self.delay_ms <= 0.0 || self.delay_ms > Self::MAX_DELAY_MS
        {
            return Err(format!(
                "delay_ms must be in (0, {}], got {}",
                Self::MAX_DELAY_MS,
                self.delay_ms
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Echo,
    Reverb,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => f.write_str("echo"),
            Self::Reverb => f.write_str("reverb"),
        }
    }
}

/// Single-input edit. Times are seconds from the start of the head version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOperation {
    Trim { start: f64, end: f64 },
    Extend { start: f64, end: f64 },
    Shorten { start: f64, end: f64 },
    Effect {
        kind: EffectKind,
        #[serde(default)]
        params: Option<EchoParams>,
    },
}

impl EditOperation {
    /// Checks that do not depend on the source audio.
    pub fn validate_shape(&self) -> Result<(), String> {
        match self {
            Self::Trim { start, end } | Self::Extend { start, end } | Self::Shorten { start, end } => {
                validate_range(*start, *end)
            }
            Self::Effect { kind, params } => match (kind, params) {
                (EffectKind::Reverb, Some(_)) => {
                    Err("reverb does not take parameters".to_string())
                }
                (_, Some(p)) => p.validate(),
                (_, None) => Ok(()),
            },
        }
    }

    /// Full validation against the duration of the version being edited and
    /// conversion into a media-engine transform.
    ///
    /// A zero `source_duration` means the duration was never measured; range
    /// checks that need it are skipped for `trim` only.
    pub fn plan(&self, source_duration: f64) -> Result<TranscodeOp, String> {
        self.validate_shape()?;

        match *self {
            Self::Trim { start, end } => {
                if source_duration > 0.0 && end > source_duration {
                    return Err(format!(
                        "end ({end}) is past the end of the audio ({source_duration})"
                    ));
                }
                Ok(TranscodeOp::Trim { start, end })
            }
            Self::Extend { start, end } => {
                require_within(end, source_duration)?;
                Ok(TranscodeOp::Extend { start, end })
            }
            Self::Shorten { start, end } => {
                require_within(end, source_duration)?;
                if start == 0.0 && end == source_duration {
                    return Err("shorten would remove the entire audio".to_string());
                }
                Ok(TranscodeOp::Shorten {
                    start,
                    end,
                    source_duration,
                })
            }
            Self::Effect { kind, params } => Ok(TranscodeOp::Echo(match kind {
                EffectKind::Echo => params.unwrap_or(EchoParams::ECHO),
                EffectKind::Reverb => EchoParams::REVERB,
            })),
        }
    }

    /// Duration the result should have, used for logging.
    pub fn expected_duration(&self, source_duration: f64) -> f64 {
        match *self {
            Self::Trim { start, end } => end - start,
            Self::Extend { start, end } => source_duration + (end - start),
            Self::Shorten { start, end } => source_duration - (end - start),
            Self::Effect { .. } => source_duration,
        }
    }

    /// Activity-log wording.
    pub fn describe(&self, logical_name: &str) -> String {
        match self {
            Self::Trim { start, end } => {
                format!("Trimmed {logical_name} to [{start}, {end})")
            }
            Self::Extend { start, end } => {
                format!("Extended {logical_name} by repeating [{start}, {end})")
            }
            Self::Shorten { start, end } => {
                format!("Shortened {logical_name} by removing [{start}, {end})")
            }
            Self::Effect { kind, .. } => format!("Applied {kind} to {logical_name}"),
        }
    }
}

fn validate_range(start: f64, end: f64) -> Result<(), String> {
    if !start.is_finite() || !end.is_finite() {
        return Err("start and end must be finite numbers".to_string());
    }
    if start < 0.0 {
        return Err(format!("start must not be negative, got {start}"));
    }
    if end <= start {
        return Err(format!("end ({end}) must be greater than start ({start})"));
    }
    Ok(())
}

fn require_within(end: f64, source_duration: f64) -> Result<(), String> {
    if source_duration <= 0.0 {
        return Err("the duration of the source audio is unknown".to_string());
    }
    if end > source_duration {
        return Err(format!(
            "end ({end}) is past the end of the audio ({source_duration})"
        ));
    }
    Ok(())
}
