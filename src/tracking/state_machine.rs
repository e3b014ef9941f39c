//! Operating state of a device derived from its telemetry.
//!
//! ```text
//!  DETENIDO ──[moving + activity]──▶ REGANDO
//!     ▲                               │   ▲
//!     │                  [still × N]  │   │ [moving + activity]
//!     │                               ▼   │
//!     └────[stall > idle timeout]──── PAUSADO
//!
//!  Any state ──[silence > idle timeout | stop signal]──▶ DETENIDO
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrackingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingState {
    #[default]
    Detenido,
    Regando,
    Pausado,
}

impl OperatingState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detenido => "detenido",
            Self::Regando => "regando",
            Self::Pausado => "pausado",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "detenido" => Some(Self::Detenido),
            "regando" => Some(Self::Regando),
            "pausado" => Some(Self::Pausado),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Movement,
    Stalled,
    Resumed,
    IdleTimeout,
    StallTimeout,
    StopSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: OperatingState,
    pub to: OperatingState,
    pub reason: TransitionReason,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateMachine {
    state: OperatingState,
    still_samples: u32,
    last_sample_at: Option<DateTime<Utc>>,
    last_motion_at: Option<DateTime<Utc>>,
}

impl DeviceStateMachine {
    #[must_use]
    pub fn state(&self) -> OperatingState {
        self.state
    }

    #[must_use]
    pub fn last_motion_at(&self) -> Option<DateTime<Utc>> {
        self.last_motion_at
    }

    /// Feed one sample. `delta_deg` is the signed angular change since the
    /// previous sample (`None` for the first sample of a device); `activity`
    /// tells whether the telemetry indicates water flow.
    pub fn on_sample(
        &mut self,
        delta_deg: Option<f64>,
        activity: bool,
        at: DateTime<Utc>,
        cfg: &TrackingConfig,
    ) -> Option<StateTransition> {
        self.last_sample_at = Some(at);

        let magnitude = delta_deg.map_or(0.0, f64::abs);
        let moving = delta_deg.is_some() && magnitude > cfg.movement_threshold_deg;
        let still = magnitude <= cfg.pause_tolerance_deg;

        if !still {
            self.last_motion_at = Some(at);
        }

        match self.state {
            OperatingState::Detenido if moving && activity => {
                self.still_samples = 0;
                Some(self.transition(OperatingState::Regando, TransitionReason::Movement, at))
            }
            OperatingState::Regando => {
                if still {
                    self.still_samples += 1;
                    if self.still_samples >= cfg.pause_samples.max(1) {
                        return Some(self.transition(
                            OperatingState::Pausado,
                            TransitionReason::Stalled,
                            at,
                        ));
                    }
                } else {
                    self.still_samples = 0;
                }
                None
            }
            OperatingState::Pausado if moving && activity => {
                self.still_samples = 0;
                Some(self.transition(OperatingState::Regando, TransitionReason::Resumed, at))
            }
            _ => None,
        }
    }

    /// Evaluate timeouts at `now`: silence, or a pause that outlived the idle
    /// timeout, drives the device to `Detenido`.
    pub fn on_tick(&mut self, now: DateTime<Utc>, cfg: &TrackingConfig) -> Option<StateTransition> {
        if self.state == OperatingState::Detenido {
            return None;
        }
        let timeout = cfg.idle_timeout();

        if self.last_sample_at.is_none_or(|last| now - last > timeout) {
            return Some(self.transition(
                OperatingState::Detenido,
                TransitionReason::IdleTimeout,
                now,
            ));
        }

        if self.state == OperatingState::Pausado
            && self.last_motion_at.is_none_or(|last| now - last > timeout)
        {
            return Some(self.transition(
                OperatingState::Detenido,
                TransitionReason::StallTimeout,
                now,
            ));
        }

        None
    }

    /// Explicit stop signal.
    pub fn stop(&mut self, at: DateTime<Utc>) -> Option<StateTransition> {
        if self.state == OperatingState::Detenido {
            return None;
        }
        Some(self.transition(OperatingState::Detenido, TransitionReason::StopSignal, at))
    }

    fn transition(
        &mut self,
        to: OperatingState,
        reason: TransitionReason,
        at: DateTime<Utc>,
    ) -> StateTransition {
        let from = self.state;
        self.state = to;
        self.still_samples = 0;
        StateTransition { from, to, reason, at }
    }
}
