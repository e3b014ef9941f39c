//! Angle to sector resolution and sector transition detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::circular::normalize;
use super::sectors::{SectorId, SectorSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SectorEvent {
    /// Left `sector` after `dwell_secs` inside it.
    Exit {
        sector: SectorId,
        at: DateTime<Utc>,
        dwell_secs: f64,
    },
    /// Entered `sector`; `since_last_secs` is the time since the previous transition.
    Enter {
        sector: SectorId,
        at: DateTime<Utc>,
        since_last_secs: f64,
    },
}

impl SectorEvent {
    #[must_use]
    pub fn sector(&self) -> SectorId {
        match self {
            Self::Exit { sector, .. } | Self::Enter { sector, .. } => *sector,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionResolver {
    current: Option<SectorId>,
    last_transition_at: Option<DateTime<Utc>>,
}

impl PositionResolver {
    /// Resolve `angle` and report the transitions it causes.
    ///
    /// A missing or non-finite angle changes nothing.
    pub fn observe(
        &mut self,
        sectors: &SectorSet,
        angle: Option<f64>,
        at: DateTime<Utc>,
    ) -> Vec<SectorEvent> {
        let Some(angle) = angle.filter(|a| a.is_finite()) else {
            return Vec::new();
        };

        let resolved = sectors.resolve(normalize(angle)).map(|s| s.id);
        if resolved == self.current {
            return Vec::new();
        }

        let elapsed = self
            .last_transition_at
            .map_or(0.0, |prev| seconds_between(prev, at));

        let mut events = Vec::with_capacity(2);
        if let Some(sector) = self.current {
            events.push(SectorEvent::Exit {
                sector,
                at,
                dwell_secs: elapsed,
            });
        }
        if let Some(sector) = resolved {
            events.push(SectorEvent::Enter {
                sector,
                at,
                since_last_secs: elapsed,
            });
        }

        self.current = resolved;
        self.last_transition_at = Some(at);
        events
    }

    #[must_use]
    pub fn current(&self) -> Option<SectorId> {
        self.current
    }

    #[must_use]
    pub fn last_transition_at(&self) -> Option<DateTime<Utc>> {
        self.last_transition_at
    }
}

/// Seconds from `from` to `to`, never negative.
#[must_use]
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0);
    millis as f64 / 1000.0
}
