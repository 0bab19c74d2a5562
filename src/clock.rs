//! Sequencer clock.
//!
//! A periodic step scheduler driven by an external time source. The clock
//! itself never sleeps: the owner polls it with the current time (audio time
//! in the live graph, a tokio interval in the realtime driver) and fires a
//! tick whenever it reports one is due. Overdue deadlines collapse into a
//! single tick; they are never queued.

use std::fmt;
use std::time::Duration;

/// Steps in one measure. Every track pattern is read modulo its own length
/// against this global index.
pub const GLOBAL_STEP_COUNT: usize = 16;

pub const MIN_BPM: u32 = 30;
pub const MAX_BPM: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
}

/// Step-advance callback, invoked with the global step that just played.
pub type StepObserver = Box<dyn FnMut(usize)>;

pub struct SequencerClock {
    bpm: u32,
    state: ClockState,
    step: usize,
    /// Next tick deadline; unset until the first poll after `play`.
    next_tick: Option<Duration>,
    observer: Option<StepObserver>,
}

impl fmt::Debug for SequencerClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencerClock")
            .field("bpm", &self.bpm)
            .field("state", &self.state)
            .field("step", &self.step)
            .field("next_tick", &self.next_tick)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl SequencerClock {
    pub fn new(bpm: u32) -> Self {
        SequencerClock {
            bpm: bpm.clamp(MIN_BPM, MAX_BPM),
            state: ClockState::Stopped,
            step: 0,
            next_tick: None,
            observer: None,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    /// Duration of one sixteenth-note step.
    pub fn step_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm as f64 / 4.0)
    }

    /// Start from step 0. Does nothing if already running.
    pub fn play(&mut self) {
        if self.is_running() {
            return;
        }
        self.step = 0;
        self.next_tick = None;
        self.state = ClockState::Running;
        log::debug!("clock started at {} BPM ({:?} per step)", self.bpm, self.step_interval());
    }

    /// Halt and rewind to step 0. Idempotent.
    pub fn stop(&mut self) {
        if self.is_running() {
            log::debug!("clock stopped");
        }
        self.state = ClockState::Stopped;
        self.step = 0;
        self.next_tick = None;
    }

    /// Change tempo, clamped to [`MIN_BPM`, `MAX_BPM`]. A running clock is
    /// restarted so the new interval takes effect, which rewinds to step 0.
    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        if self.is_running() {
            self.stop();
            self.play();
        }
        self.bpm
    }

    pub fn set_observer(&mut self, observer: Option<StepObserver>) {
        self.observer = observer;
    }

    /// Report whether a tick is due at `now`.
    ///
    /// The first poll after `play` only arms the schedule, so the first tick
    /// lands one interval later. If several deadlines have passed, one tick
    /// is reported and the schedule re-anchors to the next future deadline.
    pub fn poll(&mut self, now: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        let interval = self.step_interval();
        match self.next_tick {
            None => {
                self.next_tick = Some(now + interval);
                false
            }
            Some(deadline) if now >= deadline => {
                let mut next = deadline + interval;
                let mut skipped = 0u32;
                while next <= now {
                    next += interval;
                    skipped += 1;
                }
                if skipped > 0 {
                    log::debug!("clock overran; skipped {skipped} tick(s)");
                }
                self.next_tick = Some(next);
                true
            }
            Some(_) => false,
        }
    }

    /// Close out the current tick: notify the observer with the step that
    /// just played, then advance.
    pub fn finish_tick(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer(self.step);
        }
        self.step = (self.step + 1) % GLOBAL_STEP_COUNT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const STEP_120: Duration = Duration::from_millis(125);

    fn recording_clock() -> (SequencerClock, Rc<RefCell<Vec<usize>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut clock = SequencerClock::new(120);
        clock.set_observer(Some(Box::new(move |step| sink.borrow_mut().push(step))));
        (clock, seen)
    }

    /// Poll like a host would and run every reported tick.
    fn drive(clock: &mut SequencerClock, now: Duration) -> bool {
        let due = clock.poll(now);
        if due {
            clock.finish_tick();
        }
        due
    }

    #[test]
    fn interval_follows_tempo() {
        assert_eq!(SequencerClock::new(120).step_interval(), STEP_120);
        assert_eq!(SequencerClock::new(60).step_interval(), Duration::from_millis(250));
    }

    #[test]
    fn tempo_is_clamped() {
        let mut clock = SequencerClock::new(5);
        assert_eq!(clock.bpm(), MIN_BPM);
        assert_eq!(clock.set_bpm(1000), MAX_BPM);
    }

    #[test]
    fn first_tick_is_one_interval_after_arming() {
        let (mut clock, seen) = recording_clock();
        clock.play();
        assert!(!drive(&mut clock, Duration::ZERO));
        assert!(!drive(&mut clock, Duration::from_millis(124)));
        assert!(drive(&mut clock, STEP_120));
        assert_eq!(*seen.borrow(), vec![0]);
        assert_eq!(clock.current_step(), 1);
    }

    #[test]
    fn steps_wrap_after_sixteen() {
        let (mut clock, seen) = recording_clock();
        clock.play();
        drive(&mut clock, Duration::ZERO);
        for i in 1..=18u32 {
            drive(&mut clock, STEP_120 * i);
        }
        let expected: Vec<usize> = (0..18).map(|i| i % 16).collect();
        assert_eq!(*seen.borrow(), expected);
    }

    #[test]
    fn overdue_ticks_are_skipped_not_queued() {
        let (mut clock, seen) = recording_clock();
        clock.play();
        drive(&mut clock, Duration::ZERO);
        // ten deadlines have passed; only one tick fires
        assert!(drive(&mut clock, STEP_120 * 10));
        assert!(!drive(&mut clock, STEP_120 * 10 + Duration::from_millis(1)));
        assert_eq!(seen.borrow().len(), 1);
        // re-anchored to the next future deadline
        assert!(drive(&mut clock, STEP_120 * 11));
        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn play_while_running_is_noop() {
        let (mut clock, _) = recording_clock();
        clock.play();
        drive(&mut clock, Duration::ZERO);
        drive(&mut clock, STEP_120);
        clock.play();
        assert_eq!(clock.current_step(), 1);
    }

    #[test]
    fn stop_rewinds_and_silences() {
        let (mut clock, seen) = recording_clock();
        clock.play();
        drive(&mut clock, Duration::ZERO);
        drive(&mut clock, STEP_120);
        drive(&mut clock, STEP_120 * 2);
        clock.stop();
        assert_eq!(clock.current_step(), 0);
        assert_eq!(clock.state(), ClockState::Stopped);
        for i in 3..10u32 {
            assert!(!drive(&mut clock, STEP_120 * i));
        }
        assert_eq!(seen.borrow().len(), 2);
        clock.stop();
        assert_eq!(clock.current_step(), 0);
    }

    #[test]
    fn bpm_change_while_running_restarts() {
        let (mut clock, _) = recording_clock();
        clock.play();
        drive(&mut clock, Duration::ZERO);
        drive(&mut clock, STEP_120);
        drive(&mut clock, STEP_120 * 2);
        assert_eq!(clock.current_step(), 2);
        clock.set_bpm(60);
        assert!(clock.is_running());
        assert_eq!(clock.current_step(), 0);
        // re-armed: nothing fires until a full new interval has elapsed
        let t = STEP_120 * 3;
        assert!(!drive(&mut clock, t));
        assert!(!drive(&mut clock, t + Duration::from_millis(200)));
        assert!(drive(&mut clock, t + Duration::from_millis(250)));
    }

    #[test]
    fn bpm_change_while_stopped_keeps_stopped() {
        let mut clock = SequencerClock::new(120);
        clock.set_bpm(90);
        assert!(!clock.is_running());
        assert!(!clock.poll(Duration::from_secs(10)));
    }
}
