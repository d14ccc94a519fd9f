/// Times closer than this are treated as equal.
pub const TIME_EPSILON: f64 = 1e-9;

/// One communication interval handed to `do_step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommunicationStep {
    /// Zero-based step index.
    pub index: usize,
    /// Communication point the step starts from.
    pub time: f64,
    /// Requested step size.
    pub size: f64,
}

/// A communication clock that walks from a start time to a stop time.
///
/// Each tick yields the next communication step and advances the clock to
/// its end. A component that returns early moves the clock back with
/// [`resume_from`](Self::resume_from).
///
/// # Examples
///
/// ```
/// use pipeline_cosim::session::clock::CommunicationClock;
///
/// let mut clock = CommunicationClock::new(0.0, 1.0, 0.5);
/// let mut points = Vec::new();
///
/// clock.run(|step| points.push(step.time));
/// assert_eq!(points, vec![0.0, 0.5]);
/// ```
#[derive(Debug, Clone)]
pub struct CommunicationClock {
    /// Current communication point
    current: f64,
    /// Time at which the clock stops
    stop: f64,
    /// Nominal step size
    step_size: f64,
    /// Steps handed out so far
    ticks: usize,
}

impl CommunicationClock {
    /// Creates a clock over `[start, stop]`.
    ///
    /// # Arguments
    ///
    /// * `start` - First communication point
    /// * `stop` - Time the last step ends at
    /// * `step_size` - Nominal step size; a non-positive size yields no steps
    pub fn new(start: f64, stop: f64, step_size: f64) -> Self {
        Self {
            current: start,
            stop,
            step_size,
            ticks: 0,
        }
    }

    /// Current communication point.
    pub fn now(&self) -> f64 {
        self.current
    }

    /// Number of steps handed out so far.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Returns `true` once the stop time has been reached.
    pub fn is_finished(&self) -> bool {
        self.step_size <= 0.0 || self.current >= self.stop - TIME_EPSILON
    }

    /// Advances the clock by one nominal step.
    ///
    /// # Returns
    ///
    /// * `Some(step)` - The step starting at the current point
    /// * `None` - If the stop time has been reached
    pub fn tick(&mut self) -> Option<CommunicationStep> {
        self.tick_until(None)
    }

    /// Like [`tick`](Self::tick), but shortens the step so it ends no later
    /// than `limit` when `limit` lies ahead of the current point.
    pub fn tick_until(&mut self, limit: Option<f64>) -> Option<CommunicationStep> {
        if self.is_finished() {
            return None;
        }
        let mut size = self.step_size.min(self.stop - self.current);
        if let Some(limit) = limit {
            if limit > self.current + TIME_EPSILON {
                size = size.min(limit - self.current);
            }
        }
        let step = CommunicationStep {
            index: self.ticks,
            time: self.current,
            size,
        };
        self.current += size;
        self.ticks += 1;
        Some(step)
    }

    /// Moves the clock to `time`, where the component actually stopped.
    pub fn resume_from(&mut self, time: f64) {
        self.current = time;
    }

    /// Runs a function for each remaining step.
    pub fn run(&mut self, mut f: impl FnMut(CommunicationStep)) {
        while let Some(step) = self.tick() {
            f(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick() {
        let mut clock = CommunicationClock::new(0.0, 2.0, 1.0);
        assert_eq!(clock.tick().map(|s| (s.index, s.time)), Some((0, 0.0)));
        assert_eq!(clock.tick().map(|s| (s.index, s.time)), Some((1, 1.0)));
        assert_eq!(clock.tick(), None);
    }

    #[test]
    fn test_last_step_is_shortened() {
        let mut clock = CommunicationClock::new(0.0, 2.5, 1.0);
        let sizes: Vec<_> = std::iter::from_fn(|| clock.tick()).map(|s| s.size).collect();
        assert_eq!(sizes, vec![1.0, 1.0, 0.5]);
    }

    #[test]
    fn test_tick_until_limit() {
        let mut clock = CommunicationClock::new(0.0, 10.0, 1.0);
        let step = clock.tick_until(Some(0.25)).expect("step");
        assert_eq!(step.size, 0.25);
        assert_eq!(clock.now(), 0.25);
        // A limit at or behind the current point is ignored.
        let step = clock.tick_until(Some(0.25)).expect("step");
        assert_eq!(step.size, 1.0);
    }

    #[test]
    fn test_resume_from() {
        let mut clock = CommunicationClock::new(0.0, 3.0, 1.0);
        clock.tick();
        clock.resume_from(0.4);
        assert_eq!(clock.tick().map(|s| s.time), Some(0.4));
    }

    #[test]
    fn test_empty_clock() {
        let mut clock = CommunicationClock::new(1.0, 1.0, 0.5);
        assert_eq!(clock.tick(), None);

        let mut was_called = false;
        clock.run(|_| was_called = true);
        assert!(!was_called);
    }

    #[test]
    fn test_non_positive_step_never_ticks() {
        let mut clock = CommunicationClock::new(0.0, 1.0, 0.0);
        assert!(clock.is_finished());
        assert_eq!(clock.tick(), None);
    }
}
