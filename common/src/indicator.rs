//! Pulse-count indicator.
//!
//! A value is shown one decimal digit at a time, most significant first. A
//! digit `d > 0` is `d` short pulses, a zero digit is one long pulse. Digits
//! are separated by the digit gap and every sequence ends with the cycle gap,
//! after which the driver reports completion and starts over.

use crate::config::IndicatorConfig;

pub trait IndicatorOutput {
    fn set_active(&mut self, active: bool);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorState {
    pub target: u16,
    pub sequence_finished: bool,
}

impl IndicatorState {
    pub fn retarget(&mut self, candidate: u16) -> bool {
        if self.sequence_finished && candidate != self.target {
            self.target = candidate;
            self.sequence_finished = false;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Phase {
    active: bool,
    duration_ms: u32,
}

#[derive(Debug, Clone)]
struct PulseSequence {
    phases: Vec<Phase>,
    index: usize,
    phase_started_ms: u64,
}

impl PulseSequence {
    fn encode(value: u16, config: &IndicatorConfig, now_ms: u64) -> Self {
        let mut phases = Vec::new();
        if value > 0 {
            let digits = value.to_string();
            for (position, digit) in digits.bytes().map(|b| b - b'0').enumerate() {
                if position > 0 && config.digit_gap_ms > 0 {
                    phases.push(Phase {
                        active: false,
                        duration_ms: config.digit_gap_ms,
                    });
                }
                if digit == 0 {
                    phases.push(Phase {
                        active: true,
                        duration_ms: config.pulse_on_ms.saturating_mul(3),
                    });
                    phases.push(Phase {
                        active: false,
                        duration_ms: config.pulse_off_ms,
                    });
                    continue;
                }
                for _ in 0..digit {
                    phases.push(Phase {
                        active: true,
                        duration_ms: config.pulse_on_ms,
                    });
                    phases.push(Phase {
                        active: false,
                        duration_ms: config.pulse_off_ms,
                    });
                }
            }
        }
        phases.push(Phase {
            active: false,
            duration_ms: config.cycle_gap_ms,
        });

        Self {
            phases,
            index: 0,
            phase_started_ms: now_ms,
        }
    }

    fn advance(&mut self, now_ms: u64) -> Option<Phase> {
        while let Some(phase) = self.phases.get(self.index).copied() {
            let elapsed = now_ms.saturating_sub(self.phase_started_ms);
            if elapsed < u64::from(phase.duration_ms) {
                return Some(phase);
            }
            self.phase_started_ms += u64::from(phase.duration_ms);
            self.index += 1;
        }
        None
    }
}

pub struct IndicatorDriver<O> {
    output: O,
    config: IndicatorConfig,
    running: Option<PulseSequence>,
    active: bool,
}

impl<O: IndicatorOutput> IndicatorDriver<O> {
    pub fn new(mut output: O, config: IndicatorConfig) -> Self {
        output.set_active(false);
        Self {
            output,
            config,
            running: None,
            active: false,
        }
    }

    // Returns true once per sequence, on the step that finishes it. The value
    // is latched when a sequence starts.
    pub fn step(&mut self, now_ms: u64, target: u16) -> bool {
        let config = &self.config;
        let sequence = self
            .running
            .get_or_insert_with(|| PulseSequence::encode(target, config, now_ms));

        match sequence.advance(now_ms) {
            Some(phase) => {
                self.drive(phase.active);
                false
            }
            None => {
                self.drive(false);
                self.running = None;
                true
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    fn drive(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.output.set_active(active);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingOutput {
        transitions: Vec<bool>,
    }

    impl IndicatorOutput for RecordingOutput {
        fn set_active(&mut self, active: bool) {
            self.transitions.push(active);
        }
    }

    fn config() -> IndicatorConfig {
        IndicatorConfig {
            pulse_on_ms: 10,
            pulse_off_ms: 20,
            digit_gap_ms: 5,
            cycle_gap_ms: 100,
            ..IndicatorConfig::default()
        }
    }

    fn run_until_complete(driver: &mut IndicatorDriver<RecordingOutput>, target: u16) -> u64 {
        let mut now = 0;
        while !driver.step(now, target) {
            now += 1;
            assert!(now < 100_000, "sequence never completed");
        }
        now
    }

    fn pulses(driver: &IndicatorDriver<RecordingOutput>) -> usize {
        driver
            .output()
            .transitions
            .iter()
            .filter(|active| **active)
            .count()
    }

    #[test]
    fn encodes_each_digit_as_pulse_count() {
        let mut driver = IndicatorDriver::new(RecordingOutput::default(), config());

        let finished_at = run_until_complete(&mut driver, 23);

        assert_eq!(pulses(&driver), 5);
        // 5 pulses of (10 + 20), one digit gap, one cycle gap
        assert_eq!(finished_at, 5 * 30 + 5 + 100);
        assert!(!driver.is_active());
    }

    #[test]
    fn zero_digit_is_one_long_pulse() {
        let mut driver = IndicatorDriver::new(RecordingOutput::default(), config());

        let finished_at = run_until_complete(&mut driver, 10);

        assert_eq!(pulses(&driver), 2);
        assert_eq!(finished_at, 30 + 5 + (30 + 20) + 100);
    }

    #[test]
    fn zero_target_only_waits_out_the_cycle_gap() {
        let mut driver = IndicatorDriver::new(RecordingOutput::default(), config());

        assert_eq!(run_until_complete(&mut driver, 0), 100);
        assert_eq!(pulses(&driver), 0);
    }

    #[test]
    fn completion_is_reported_once_per_sequence() {
        let mut driver = IndicatorDriver::new(RecordingOutput::default(), config());
        let mut completions = 0;

        for now in 0..=(30 + 100) {
            if driver.step(now, 1) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);

        // the next step starts a fresh sequence
        assert!(!driver.step(131, 1));
        assert!(driver.is_active());
    }

    #[test]
    fn coarse_ticks_catch_up_over_elapsed_phases() {
        let mut driver = IndicatorDriver::new(RecordingOutput::default(), config());

        assert!(!driver.step(0, 9));
        assert!(driver.step(10_000, 9));
    }

    #[test]
    fn target_is_latched_for_the_running_sequence() {
        let mut driver = IndicatorDriver::new(RecordingOutput::default(), config());

        assert!(!driver.step(0, 1));
        // a different target mid-sequence does not restart it
        assert!(!driver.step(15, 9));
        assert!(driver.step(130, 9));
    }

    #[test]
    fn retarget_requires_finished_sequence_and_new_value() {
        let mut state = IndicatorState {
            target: 450,
            sequence_finished: false,
        };

        assert!(!state.retarget(500));
        assert_eq!(state.target, 450);

        state.sequence_finished = true;
        assert!(!state.retarget(450));
        assert!(state.sequence_finished);

        assert!(state.retarget(500));
        assert_eq!(
            state,
            IndicatorState {
                target: 500,
                sequence_finished: false,
            }
        );
    }
}
