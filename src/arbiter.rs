// src/arbiter.rs
//
// Finite-state arbitration between autonomous and manual control. Two
// independent signals drive transitions: the externally supplied severity
// tier (which sets a forced-manual lock) and the smoothed anomaly signal
// (advisory, evaluated only while the lock is off). Severity always wins.

use crate::smoother::SmoothedSignal;
use crate::types::{AnomalyConfig, ArbiterConfig, ControlMode, SeverityLevel};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterState {
    pub mode: ControlMode,
    pub forced_manual_lock: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchReason {
    /// Severity reached the severe tier; lock engaged.
    SeverityOverride,
    /// Severity dropped below the severe tier; lock released.
    SeverityCleared,
    /// Smoothed anomaly signal is forcing manual control.
    AnomalyHigh,
    /// Sustained low scores; autonomous control restored.
    AnomalyRecovered,
}

/// Emitted whenever the arbiter state changes; the supervisor drives
/// `set_autopilot` and the event log off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: ArbiterState,
    pub to: ArbiterState,
    pub reason: SwitchReason,
}

pub struct ModeArbiter {
    config: ArbiterConfig,
    anomaly: AnomalyConfig,
    state: ArbiterState,
}

impl ModeArbiter {
    pub fn new(config: ArbiterConfig, anomaly: AnomalyConfig) -> Self {
        Self {
            config,
            anomaly,
            state: ArbiterState {
                mode: ControlMode::Autonomous,
                forced_manual_lock: false,
            },
        }
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    pub fn mode(&self) -> ControlMode {
        self.state.mode
    }

    fn anomaly_forcing(&self, signal: &SmoothedSignal) -> bool {
        signal.mean > self.anomaly.threshold || signal.high_streak >= self.anomaly.streak_ticks
    }

    /// One arbitration step. Severity is applied first; when it releases the
    /// lock, the anomaly path is re-evaluated on the same tick so a still-high
    /// signal keeps the vehicle in manual without an autonomous blip.
    pub fn update(
        &mut self,
        severity: SeverityLevel,
        signal: &SmoothedSignal,
    ) -> Option<ModeTransition> {
        let prior = self.state;
        let severity_high = severity.tier() >= self.config.severe_tier;

        let reason = if severity_high {
            self.state.forced_manual_lock = true;
            self.state.mode = ControlMode::Manual;
            SwitchReason::SeverityOverride
        } else if prior.forced_manual_lock {
            self.state.forced_manual_lock = false;
            if self.anomaly_forcing(signal) {
                self.state.mode = ControlMode::Manual;
                SwitchReason::AnomalyHigh
            } else {
                self.state.mode = ControlMode::Autonomous;
                SwitchReason::SeverityCleared
            }
        } else {
            match prior.mode {
                ControlMode::Autonomous if self.anomaly_forcing(signal) => {
                    self.state.mode = ControlMode::Manual;
                    SwitchReason::AnomalyHigh
                }
                ControlMode::Manual if signal.low_streak >= self.anomaly.streak_ticks => {
                    self.state.mode = ControlMode::Autonomous;
                    SwitchReason::AnomalyRecovered
                }
                _ => return None,
            }
        };

        if self.state == prior {
            return None;
        }

        let transition = ModeTransition {
            from: prior,
            to: self.state,
            reason,
        };

        match reason {
            SwitchReason::SeverityOverride => warn!(
                "🚨 Severity tier {} >= {}: forcing manual control (locked)",
                severity.tier(),
                self.config.severe_tier
            ),
            SwitchReason::SeverityCleared => info!(
                "✅ Severity tier {} safe again: lock released, autonomous control restored",
                severity.tier()
            ),
            SwitchReason::AnomalyHigh => warn!(
                "🚨 Anomaly signal high (mean={:.2}, streak={}): switching to manual",
                signal.mean, signal.high_streak
            ),
            SwitchReason::AnomalyRecovered => info!(
                "✅ Anomaly low for {} ticks (mean={:.2}): restoring autonomous control",
                signal.low_streak, signal.mean
            ),
        }

        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> ModeArbiter {
        ModeArbiter::new(ArbiterConfig::default(), AnomalyConfig::default())
    }

    fn low() -> SmoothedSignal {
        SmoothedSignal {
            mean: 1.0,
            high_streak: 0,
            low_streak: 10,
        }
    }

    fn high() -> SmoothedSignal {
        SmoothedSignal {
            mean: 25.0,
            high_streak: 5,
            low_streak: 0,
        }
    }

    #[test]
    fn test_initial_state_is_autonomous_unlocked() {
        let arbiter = arbiter();
        assert_eq!(arbiter.mode(), ControlMode::Autonomous);
        assert!(!arbiter.state().forced_manual_lock);
    }

    #[test]
    fn test_severity_sequence_0_0_3_0() {
        // Severity [0, 0, 3, 0] with anomaly always low: modes
        // [Autonomous, Autonomous, Manual(locked), Autonomous];
        // lock true only on the third tick.
        let mut arbiter = arbiter();
        let tiers = [0u8, 0, 3, 0];
        let mut observed = Vec::new();

        for tier in tiers {
            arbiter.update(SeverityLevel(tier), &low());
            observed.push(arbiter.state());
        }

        assert_eq!(observed[0].mode, ControlMode::Autonomous);
        assert_eq!(observed[1].mode, ControlMode::Autonomous);
        assert_eq!(observed[2].mode, ControlMode::Manual);
        assert_eq!(observed[3].mode, ControlMode::Autonomous);
        assert!(observed.iter().map(|s| s.forced_manual_lock).eq([false, false, true, false]));
    }

    #[test]
    fn test_lock_survives_low_anomaly_while_severity_high() {
        let mut arbiter = arbiter();
        arbiter.update(SeverityLevel(4), &low());
        assert!(arbiter.state().forced_manual_lock);

        // Transient low scores must never release the lock on their own.
        for _ in 0..20 {
            arbiter.update(SeverityLevel(4), &low());
            assert_eq!(arbiter.mode(), ControlMode::Manual);
            assert!(arbiter.state().forced_manual_lock);
        }
    }

    #[test]
    fn test_anomaly_mean_above_threshold_switches_within_three_ticks() {
        // Constant mean 25 (> threshold 20), severity 0: manual by the
        // third tick, lock stays false.
        let mut arbiter = arbiter();
        let signal = SmoothedSignal {
            mean: 25.0,
            high_streak: 1,
            low_streak: 0,
        };

        let mut switched_at = None;
        for tick in 1..=3 {
            arbiter.update(SeverityLevel(0), &signal);
            if arbiter.mode() == ControlMode::Manual && switched_at.is_none() {
                switched_at = Some(tick);
            }
        }

        assert!(switched_at.unwrap() <= 3);
        assert!(!arbiter.state().forced_manual_lock);
    }

    #[test]
    fn test_high_streak_alone_forces_manual() {
        let mut arbiter = arbiter();
        // Mean still below threshold, but the raw score has exceeded it
        // for streak_ticks consecutive ticks.
        let signal = SmoothedSignal {
            mean: 15.0,
            high_streak: 3,
            low_streak: 0,
        };
        let transition = arbiter.update(SeverityLevel(0), &signal).unwrap();
        assert_eq!(transition.reason, SwitchReason::AnomalyHigh);
        assert_eq!(arbiter.mode(), ControlMode::Manual);
    }

    #[test]
    fn test_sustained_low_restores_autonomous_within_one_tick() {
        let mut arbiter = arbiter();
        arbiter.update(SeverityLevel(0), &high());
        assert_eq!(arbiter.mode(), ControlMode::Manual);

        // Streak not yet complete: stay manual.
        for streak in 1..3 {
            let signal = SmoothedSignal {
                mean: 1.0,
                high_streak: 0,
                low_streak: streak,
            };
            arbiter.update(SeverityLevel(0), &signal);
            assert_eq!(arbiter.mode(), ControlMode::Manual);
        }

        let signal = SmoothedSignal {
            mean: 1.0,
            high_streak: 0,
            low_streak: 3,
        };
        let transition = arbiter.update(SeverityLevel(0), &signal).unwrap();
        assert_eq!(transition.reason, SwitchReason::AnomalyRecovered);
        assert_eq!(arbiter.mode(), ControlMode::Autonomous);
    }

    #[test]
    fn test_lock_clear_reevaluates_anomaly_same_tick() {
        let mut arbiter = arbiter();
        arbiter.update(SeverityLevel(5), &low());
        assert!(arbiter.state().forced_manual_lock);

        // Severity clears while the anomaly signal is still forcing:
        // lock drops, mode stays manual, no autonomous blip.
        let transition = arbiter.update(SeverityLevel(0), &high()).unwrap();
        assert_eq!(transition.reason, SwitchReason::AnomalyHigh);
        assert_eq!(arbiter.mode(), ControlMode::Manual);
        assert!(!arbiter.state().forced_manual_lock);
    }

    #[test]
    fn test_severity_wins_over_low_anomaly_entering_lock() {
        let mut arbiter = arbiter();
        let transition = arbiter.update(SeverityLevel(3), &low()).unwrap();
        assert_eq!(transition.reason, SwitchReason::SeverityOverride);
        assert_eq!(arbiter.mode(), ControlMode::Manual);
        assert!(arbiter.state().forced_manual_lock);
    }

    #[test]
    fn test_lock_engaged_while_already_manual_reports_transition() {
        let mut arbiter = arbiter();
        arbiter.update(SeverityLevel(0), &high());
        assert_eq!(arbiter.mode(), ControlMode::Manual);

        // Mode unchanged but the lock engaging is still a state change the
        // supervisor must see.
        let transition = arbiter.update(SeverityLevel(3), &high()).unwrap();
        assert_eq!(transition.reason, SwitchReason::SeverityOverride);
        assert!(transition.to.forced_manual_lock);
        assert_eq!(transition.to.mode, ControlMode::Manual);
    }

    #[test]
    fn test_steady_states_emit_no_transition() {
        let mut arbiter = arbiter();
        assert!(arbiter.update(SeverityLevel(0), &low()).is_none());

        arbiter.update(SeverityLevel(3), &low());
        // Holding severity high keeps the locked state without re-reporting.
        assert!(arbiter.update(SeverityLevel(3), &low()).is_none());
    }
}
