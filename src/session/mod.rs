//! Single-component stepping loop.
//!
//! A [`Session`] takes one driver through a complete run: instantiate,
//! initialize, step across the configured interval while injecting
//! scheduled input values and sampling delivered outputs, then tear down.
//! It does not route signals between components.

pub mod clock;

use std::fmt;

use serde::Deserialize;
use tracing::{debug, info};

use crate::ValueReference;
use crate::description::Causality;
use crate::driver::{CoSimulationAbi, Fmi3Driver, InstantiateOptions, VariableKind};
use crate::error::DriverError;

use clock::{CommunicationClock, TIME_EPSILON};

/// A value written to an input at a scheduled time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Injection {
    /// Simulation time of the write (s).
    pub time: f64,
    /// Input signal name.
    pub variable: String,
    pub value: i32,
}

/// Everything a session needs besides the driver.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub options: InstantiateOptions,
    pub start_time: f64,
    pub stop_time: f64,
    pub step_size: f64,
    pub tolerance: Option<f64>,
    /// Scheduled writes; need not be sorted.
    pub injections: Vec<Injection>,
}

/// Whether a sample was written by the session or read from the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Injected,
    Received,
}

impl SampleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleKind::Injected => "injected",
            SampleKind::Received => "received",
        }
    }
}

/// One value seen at the component boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub variable: String,
    pub value_reference: ValueReference,
    pub value: i32,
    pub kind: SampleKind,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>10.4}  {:<8} {:<16} vr={:<5} value={}",
            self.time,
            self.kind.as_str(),
            self.variable,
            self.value_reference,
            self.value
        )
    }
}

/// Why a session stopped stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The stop time was reached.
    StopTime,
    /// The component asked to end the simulation.
    ComponentRequested,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::StopTime => "stop time reached",
            Termination::ComponentRequested => "terminated by component",
        }
    }
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Injected and received values in the order they occurred.
    pub samples: Vec<Sample>,
    /// Number of `do_step` calls made.
    pub steps: usize,
    /// Number of time events handled.
    pub events: usize,
    /// Time the component last reached.
    pub final_time: f64,
    pub termination: Termination,
}

impl SessionReport {
    /// Values received on `variable`, as `(time, value)` pairs.
    pub fn received(&self, variable: &str) -> Vec<(f64, i32)> {
        self.samples
            .iter()
            .filter(|s| s.kind == SampleKind::Received && s.variable == variable)
            .map(|s| (s.time, s.value))
            .collect()
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let received = self
            .samples
            .iter()
            .filter(|s| s.kind == SampleKind::Received)
            .count();
        writeln!(f, "--- Session Report ---")?;
        writeln!(f, "Steps taken:        {}", self.steps)?;
        writeln!(f, "Events handled:     {}", self.events)?;
        writeln!(f, "Values injected:    {}", self.samples.len() - received)?;
        writeln!(f, "Values received:    {received}")?;
        writeln!(f, "Final time:         {:.6} s", self.final_time)?;
        write!(f, "Termination:        {}", self.termination.as_str())
    }
}

/// An output signal and the clock announcing it.
#[derive(Debug, Clone)]
struct WatchedOutput {
    signal: String,
    signal_reference: ValueReference,
    clock: String,
}

/// Drives one component through a plan.
pub struct Session<'d, B: CoSimulationAbi> {
    driver: &'d mut Fmi3Driver<B>,
    plan: &'d SessionPlan,
    outputs: Vec<WatchedOutput>,
    samples: Vec<Sample>,
    events: usize,
    terminate_requested: bool,
}

impl<'d, B: CoSimulationAbi> Session<'d, B> {
    /// Runs `plan` on `driver` from instantiation to free.
    ///
    /// # Errors
    ///
    /// Any driver error aborts the run and is returned as is; the driver
    /// finishes teardown when it is dropped.
    pub fn run(
        driver: &'d mut Fmi3Driver<B>,
        plan: &'d SessionPlan,
    ) -> Result<SessionReport, DriverError> {
        let outputs = watched_outputs(driver);
        let mut session = Session {
            driver,
            plan,
            outputs,
            samples: Vec::new(),
            events: 0,
            terminate_requested: false,
        };
        session.execute()
    }

    fn execute(&mut self) -> Result<SessionReport, DriverError> {
        let plan = self.plan;
        self.driver.instantiate(&plan.options)?;
        self.driver
            .enter_initialization_mode(plan.tolerance, plan.start_time, Some(plan.stop_time))?;
        self.driver.exit_initialization_mode()?;
        info!(
            instance = %plan.options.instance_name,
            start = plan.start_time,
            stop = plan.stop_time,
            step = plan.step_size,
            "session started"
        );

        let mut injections: Vec<&Injection> = plan.injections.iter().collect();
        injections.sort_by(|a, b| a.time.total_cmp(&b.time));
        let mut next_injection = 0;

        let mut clock = CommunicationClock::new(plan.start_time, plan.stop_time, plan.step_size);
        let mut final_time = plan.start_time;
        let mut termination = Termination::StopTime;

        loop {
            let now = clock.now();
            let due_end = injections[next_injection..]
                .iter()
                .take_while(|i| i.time <= now + TIME_EPSILON)
                .count();
            if due_end > 0 {
                let due = &injections[next_injection..next_injection + due_end];
                self.inject(now, due)?;
                next_injection += due_end;
            }
            if self.terminate_requested {
                termination = Termination::ComponentRequested;
                break;
            }

            let limit = injections.get(next_injection).map(|i| i.time);
            let Some(step) = clock.tick_until(limit) else {
                break;
            };
            let outcome = self.driver.do_step(step.time, step.size, true)?;
            final_time = outcome.last_successful_time;
            debug!(
                index = step.index,
                time = step.time,
                reached = final_time,
                event = outcome.event_handling_needed,
                "step"
            );

            if outcome.event_handling_needed {
                self.handle_time_event(outcome.last_successful_time)?;
            }
            if outcome.early_return {
                clock.resume_from(outcome.last_successful_time);
            }
            if outcome.terminate_simulation || self.terminate_requested {
                termination = Termination::ComponentRequested;
                break;
            }
        }

        self.driver.terminate()?;
        self.driver.free();
        info!(
            steps = clock.ticks(),
            events = self.events,
            samples = self.samples.len(),
            "session finished"
        );

        Ok(SessionReport {
            samples: std::mem::take(&mut self.samples),
            steps: clock.ticks(),
            events: self.events,
            final_time,
            termination,
        })
    }

    /// Writes the due injections inside one event-mode visit.
    fn inject(&mut self, time: f64, due: &[&Injection]) -> Result<(), DriverError> {
        self.driver.enter_event_mode(false, false, &[], false)?;
        for injection in due {
            let (reference, clock) = input_clock(self.driver, &injection.variable)?;
            self.driver
                .set_int32(&[injection.variable.as_str()], &[injection.value])?;
            self.driver.set_clock(&[clock.as_str()], &[true])?;
            debug!(variable = %injection.variable, value = injection.value, time, "injected");
            self.samples.push(Sample {
                time,
                variable: injection.variable.clone(),
                value_reference: reference,
                value: injection.value,
                kind: SampleKind::Injected,
            });
        }
        self.settle()?;
        self.driver.enter_step_mode()
    }

    /// Collects the outputs the component delivered at `time`.
    fn handle_time_event(&mut self, time: f64) -> Result<(), DriverError> {
        self.driver.enter_event_mode(false, false, &[], true)?;
        self.events += 1;

        let clocks: Vec<&str> = self.outputs.iter().map(|o| o.clock.as_str()).collect();
        let active = self.driver.get_clock(&clocks)?;
        let fired: Vec<WatchedOutput> = self
            .outputs
            .iter()
            .zip(active)
            .filter(|(_, active)| *active)
            .map(|(output, _)| output.clone())
            .collect();

        if !fired.is_empty() {
            let names: Vec<&str> = fired.iter().map(|p| p.signal.as_str()).collect();
            let values = self.driver.get_int32(&names)?;
            for (output, value) in fired.iter().zip(values) {
                self.samples.push(Sample {
                    time,
                    variable: output.signal.clone(),
                    value_reference: output.signal_reference,
                    value,
                    kind: SampleKind::Received,
                });
            }
        }

        self.settle()?;
        self.driver.enter_step_mode()
    }

    /// Updates discrete states until the component needs no further update.
    fn settle(&mut self) -> Result<(), DriverError> {
        loop {
            let update = self.driver.update_discrete_states()?;
            if update.terminate_simulation {
                self.terminate_requested = true;
            }
            if !update.discrete_states_need_update || update.terminate_simulation {
                return Ok(());
            }
        }
    }
}

fn watched_outputs<B: CoSimulationAbi>(driver: &Fmi3Driver<B>) -> Vec<WatchedOutput> {
    let table = driver.variables();
    let mut watched: Vec<WatchedOutput> = table
        .iter()
        .filter(|e| e.kind == VariableKind::Int32 && e.causality == Causality::Output)
        .filter_map(|e| {
            let clock = table.by_reference(e.clock?)?;
            Some(WatchedOutput {
                signal: e.name.clone(),
                signal_reference: e.value_reference,
                clock: clock.name.clone(),
            })
        })
        .collect();
    watched.sort_by_key(|p| p.signal_reference);
    watched
}

/// Reference of an input signal and the name of its clock.
fn input_clock<B: CoSimulationAbi>(
    driver: &Fmi3Driver<B>,
    variable: &str,
) -> Result<(ValueReference, String), DriverError> {
    let table = driver.variables();
    let entry = table
        .get(variable)
        .filter(|e| e.kind == VariableKind::Int32 && e.causality == Causality::Input)
        .ok_or_else(|| DriverError::UnknownVariable(variable.to_string()))?;
    let clock = entry
        .clock
        .and_then(|c| table.by_reference(c))
        .ok_or_else(|| DriverError::UnknownVariable(format!("clock of {variable}")))?;
    Ok((entry.value_reference, clock.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{DescriptionHeader, ModelDescription, emit};
    use crate::driver::{ScriptedComponent, Status, VariableTable};
    use crate::network::{TopologyBuilder, Transport};

    fn chain() -> ModelDescription {
        let mut builder = TopologyBuilder::new();
        builder
            .register_pipe("p1", "A", "B", Transport::default())
            .expect("p1");
        builder
            .register_pipe("p2", "B", "C", Transport::default())
            .expect("p2");
        emit(&builder.classify_and_allocate(), &DescriptionHeader::default())
    }

    fn plan(injections: Vec<Injection>) -> SessionPlan {
        SessionPlan {
            options: InstantiateOptions::new(
                "chain",
                &DescriptionHeader::default().instantiation_token,
            ),
            start_time: 0.0,
            stop_time: 5.0,
            step_size: 1.0,
            tolerance: None,
            injections,
        }
    }

    fn driver(delay: f64) -> Fmi3Driver<ScriptedComponent> {
        let desc = chain();
        Fmi3Driver::new(
            ScriptedComponent::from_description(&desc).with_transport_delay(delay),
            VariableTable::from_description(&desc),
        )
    }

    #[test]
    fn injected_value_arrives_after_delay() {
        let mut d = driver(1.5);
        let plan = plan(vec![Injection {
            time: 1.0,
            variable: "A".into(),
            value: 17,
        }]);
        let report = Session::run(&mut d, &plan).expect("session");
        assert_eq!(report.received("C"), vec![(2.5, 17)]);
        assert_eq!(report.termination, Termination::StopTime);
        assert_eq!(report.events, 1);
        assert_eq!(d.mode(), crate::driver::Mode::Freed);
    }

    #[test]
    fn report_summary_counts_samples() {
        let mut d = driver(1.5);
        let plan = plan(vec![Injection {
            time: 1.0,
            variable: "A".into(),
            value: 17,
        }]);
        let text = Session::run(&mut d, &plan).expect("session").to_string();
        assert!(text.contains("Values injected:    1"));
        assert!(text.contains("Values received:    1"));
        assert!(text.ends_with("stop time reached"));
    }

    #[test]
    fn quiet_run_steps_to_stop() {
        let mut d = driver(0.0);
        let report = Session::run(&mut d, &plan(Vec::new())).expect("session");
        assert_eq!(report.steps, 5);
        assert!(report.samples.is_empty());
        assert!((report.final_time - 5.0).abs() < 1e-9);
    }

    #[test]
    fn off_grid_injection_shortens_step() {
        let mut d = driver(0.0);
        let plan = plan(vec![Injection {
            time: 0.5,
            variable: "A".into(),
            value: 3,
        }]);
        let report = Session::run(&mut d, &plan).expect("session");
        let injected: Vec<_> = report
            .samples
            .iter()
            .filter(|s| s.kind == SampleKind::Injected)
            .map(|s| s.time)
            .collect();
        assert_eq!(injected, vec![0.5]);
        assert_eq!(report.received("C"), vec![(0.5, 3)]);
    }

    #[test]
    fn injecting_into_output_is_rejected() {
        let mut d = driver(0.0);
        let plan = plan(vec![Injection {
            time: 0.0,
            variable: "C".into(),
            value: 1,
        }]);
        assert_eq!(
            Session::run(&mut d, &plan),
            Err(DriverError::UnknownVariable("C".into()))
        );
    }

    #[test]
    fn step_failure_aborts_run() {
        let desc = chain();
        let mut d = Fmi3Driver::new(
            ScriptedComponent::from_description(&desc).fail_with("fmi3DoStep", Status::Error),
            VariableTable::from_description(&desc),
        );
        let err = Session::run(&mut d, &plan(Vec::new()));
        assert!(matches!(
            err,
            Err(DriverError::ExternalStatus {
                function: "fmi3DoStep",
                status: Status::Error
            })
        ));
    }
}
