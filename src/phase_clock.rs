use thiserror::Error;

use crate::constants::{HOLD_DURATION_MS, READY_DURATION_MS, SHOW_DURATION_MS};
use crate::types::Phase;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("phase schedule must declare at least one phase")]
    Empty,
    #[error("phase {index} has zero duration")]
    ZeroDuration { index: usize },
    #[error("an infinite phase must be the last entry of the schedule")]
    InfiniteNotLast,
}

/// One timed stage declaration. `duration_ms = None` means the phase never
/// auto-advances and only exits through `force_advance`.
#[derive(Clone, Copy, Debug)]
pub struct PhaseSpec {
    pub phase: Phase,
    pub duration_ms: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct PhaseSchedule {
    specs: Vec<PhaseSpec>,
}

impl PhaseSchedule {
    pub fn new(specs: Vec<PhaseSpec>) -> Result<Self, ScheduleError> {
        if specs.is_empty() {
            return Err(ScheduleError::Empty);
        }
        let last = specs.len() - 1;
        for (index, spec) in specs.iter().enumerate() {
            match spec.duration_ms {
                Some(0) => return Err(ScheduleError::ZeroDuration { index }),
                None if index != last => return Err(ScheduleError::InfiniteNotLast),
                _ => {}
            }
        }
        Ok(Self { specs })
    }

    /// Countdown, then unbounded play.
    pub fn maze_escape() -> Self {
        Self::new(vec![
            PhaseSpec {
                phase: Phase::Ready,
                duration_ms: Some(READY_DURATION_MS),
            },
            PhaseSpec {
                phase: Phase::Play,
                duration_ms: None,
            },
        ])
        .expect("built-in schedule is well-formed")
    }

    /// Reveal, hide, then wait for the answer.
    pub fn sequence_recall() -> Self {
        Self::new(vec![
            PhaseSpec {
                phase: Phase::Show,
                duration_ms: Some(SHOW_DURATION_MS),
            },
            PhaseSpec {
                phase: Phase::Hold,
                duration_ms: Some(HOLD_DURATION_MS),
            },
            PhaseSpec {
                phase: Phase::Input,
                duration_ms: None,
            },
        ])
        .expect("built-in schedule is well-formed")
    }

    /// A single open-ended input phase; turn-based games keep their own pace.
    pub fn input_only() -> Self {
        Self::new(vec![PhaseSpec {
            phase: Phase::Input,
            duration_ms: None,
        }])
        .expect("built-in schedule is well-formed")
    }

    fn spec(&self, index: usize) -> PhaseSpec {
        self.specs[index % self.specs.len()]
    }

    fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.specs.len()
    }
}

/// Schedule-agnostic timed state machine. Accumulates elapsed time and
/// carries the remainder across phase boundaries so transition timing does
/// not drift with the host frame rate.
#[derive(Clone, Debug)]
pub struct PhaseClock {
    schedule: PhaseSchedule,
    index: usize,
    elapsed_in_phase: u64,
}

impl PhaseClock {
    pub fn new(schedule: PhaseSchedule) -> Self {
        Self {
            schedule,
            index: 0,
            elapsed_in_phase: 0,
        }
    }

    pub fn current_phase(&self) -> Phase {
        self.schedule.spec(self.index).phase
    }

    pub fn input_allowed(&self) -> bool {
        self.current_phase().accepts_input()
    }

    /// Time left in the current phase; `None` while in an infinite phase.
    pub fn remaining_ms(&self) -> Option<u64> {
        self.schedule
            .spec(self.index)
            .duration_ms
            .map(|duration| duration.saturating_sub(self.elapsed_in_phase))
    }

    /// Fraction of the current phase already elapsed, for UI gauges.
    /// An infinite phase reports 0.
    pub fn progress01(&self) -> f32 {
        match self.schedule.spec(self.index).duration_ms {
            None => 0.0,
            Some(duration) => (self.elapsed_in_phase as f32 / duration as f32).clamp(0.0, 1.0),
        }
    }

    /// Advances the clock, crossing as many phase boundaries as `dt_ms`
    /// covers. Returns whether at least one transition happened.
    pub fn tick(&mut self, dt_ms: u64) -> bool {
        self.elapsed_in_phase = self.elapsed_in_phase.saturating_add(dt_ms);
        let mut changed = false;
        while let Some(duration) = self.schedule.spec(self.index).duration_ms {
            if self.elapsed_in_phase < duration {
                break;
            }
            self.elapsed_in_phase -= duration;
            self.index = self.schedule.next_index(self.index);
            changed = true;
        }
        changed
    }

    /// Leaves the current phase immediately. This is how an infinite input
    /// phase ends, e.g. when the player submits an answer.
    pub fn force_advance(&mut self) {
        self.index = self.schedule.next_index(self.index);
        self.elapsed_in_phase = 0;
    }

    /// Re-enters the first phase with zero elapsed time.
    pub fn reset(&mut self) {
        self.index = 0;
        self.elapsed_in_phase = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finite(phase: Phase, duration_ms: u64) -> PhaseSpec {
        PhaseSpec {
            phase,
            duration_ms: Some(duration_ms),
        }
    }

    #[test]
    fn rejects_malformed_schedules() {
        assert!(matches!(
            PhaseSchedule::new(Vec::new()),
            Err(ScheduleError::Empty)
        ));
        assert!(matches!(
            PhaseSchedule::new(vec![finite(Phase::Show, 0)]),
            Err(ScheduleError::ZeroDuration { index: 0 })
        ));
        assert!(matches!(
            PhaseSchedule::new(vec![
                PhaseSpec {
                    phase: Phase::Input,
                    duration_ms: None,
                },
                finite(Phase::Show, 100),
            ]),
            Err(ScheduleError::InfiniteNotLast)
        ));
    }

    #[test]
    fn advances_on_duration_boundary() {
        let schedule = PhaseSchedule::sequence_recall();
        let mut clock = PhaseClock::new(schedule);
        assert_eq!(clock.current_phase(), Phase::Show);

        assert!(!clock.tick(2_999));
        assert_eq!(clock.current_phase(), Phase::Show);
        assert!(clock.tick(1));
        assert_eq!(clock.current_phase(), Phase::Hold);
    }

    #[test]
    fn carries_remainder_across_boundaries() {
        let schedule =
            PhaseSchedule::new(vec![finite(Phase::Show, 1_000), finite(Phase::Hold, 1_000)])
                .expect("schedule should build");
        let mut clock = PhaseClock::new(schedule);

        // 1300 = 1000 (Show) + 300 into Hold; the remainder must carry over
        assert!(clock.tick(1_300));
        assert_eq!(clock.current_phase(), Phase::Hold);
        assert!((clock.progress01() - 0.3).abs() < 1e-6);

    }

    #[test]
    fn summed_phase_time_equals_total_simulated_time() {
        let schedule =
            PhaseSchedule::new(vec![finite(Phase::Show, 700), finite(Phase::Hold, 500)])
                .expect("schedule should build");
        let mut clock = PhaseClock::new(schedule);
        let mut total = 0u64;
        for dt in [130u64, 460, 925, 75, 310, 1_999, 48, 2_400] {
            clock.tick(dt);
            total += dt;

            // reconstruct position within the 1200ms cycle from the clock
            let remaining = clock.remaining_ms().expect("finite phase");
            let elapsed_in_cycle = match clock.current_phase() {
                Phase::Show => 700 - remaining,
                Phase::Hold => 700 + (500 - remaining),
                other => panic!("unexpected phase {other:?}"),
            };
            assert_eq!(
                elapsed_in_cycle,
                total % 1_200,
                "drift after {total}ms of simulated time"
            );
        }
    }

    #[test]
    fn one_large_tick_crosses_multiple_phases() {
        let schedule = PhaseSchedule::new(vec![
            finite(Phase::Ready, 100),
            finite(Phase::Show, 100),
            PhaseSpec {
                phase: Phase::Input,
                duration_ms: None,
            },
        ])
        .expect("schedule should build");
        let mut clock = PhaseClock::new(schedule);
        assert!(clock.tick(250));
        assert_eq!(clock.current_phase(), Phase::Input);
    }

    #[test]
    fn infinite_phase_never_auto_advances() {
        let mut clock = PhaseClock::new(PhaseSchedule::input_only());
        for _ in 0..1_000 {
            assert!(!clock.tick(10_000));
            assert_eq!(clock.current_phase(), Phase::Input);
        }
        assert_eq!(clock.progress01(), 0.0);
        assert_eq!(clock.remaining_ms(), None);
    }

    #[test]
    fn force_advance_exits_infinite_phase() {
        let mut clock = PhaseClock::new(PhaseSchedule::sequence_recall());
        clock.tick(5_000);
        assert_eq!(clock.current_phase(), Phase::Input);
        clock.force_advance();
        // the schedule cycles, so the clock is back at the reveal phase
        assert_eq!(clock.current_phase(), Phase::Show);
        assert_eq!(clock.progress01(), 0.0);
    }

    #[test]
    fn reset_reenters_first_phase() {
        let mut clock = PhaseClock::new(PhaseSchedule::maze_escape());
        clock.tick(10_000);
        assert_eq!(clock.current_phase(), Phase::Play);
        clock.reset();
        assert_eq!(clock.current_phase(), Phase::Ready);
        assert_eq!(clock.progress01(), 0.0);
    }

    #[test]
    fn input_gating_follows_phase() {
        let mut clock = PhaseClock::new(PhaseSchedule::maze_escape());
        assert!(!clock.input_allowed());
        clock.tick(READY_DURATION_MS);
        assert!(clock.input_allowed());
    }
}
