//! Per-instruction observation hooks.

use crate::debug;
use crate::virtual_machine::operand::Instruction;
use std::fmt::{self, Display};

/// One executed instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StepEvent {
    /// Cycle the step belongs to, starting at 0.
    pub cycle: usize,
    pub warrior: usize,
    pub task: usize,
    pub pc: usize,
    /// Cell contents at `pc` when the step started.
    pub instruction: Instruction,
    /// Address the task continues at, `None` when it died.
    pub next: Option<usize>,
    pub spawn: Option<usize>,
    pub spawn_dropped: bool,
}

impl Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle {} warrior {} task {} @{:05}: {}",
            self.cycle, self.warrior, self.task, self.pc, self.instruction
        )?;
        match self.next {
            Some(next) => write!(f, " -> {next}")?,
            None => f.write_str(" -> died")?,
        }
        if let Some(spawn) = self.spawn {
            write!(f, ", spawn {spawn}")?;
            if self.spawn_dropped {
                f.write_str(" (dropped)")?;
            }
        }
        Ok(())
    }
}

/// Receives every [`StepEvent`] the VM produces.
pub trait TraceSink {
    fn record(&mut self, event: &StepEvent);
}

/// Discards events.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoTrace;

impl TraceSink for NoTrace {
    fn record(&mut self, _event: &StepEvent) {}
}

/// Keeps every event in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingTrace {
    pub events: Vec<StepEvent>,
}

impl TraceSink for RecordingTrace {
    fn record(&mut self, event: &StepEvent) {
        self.events.push(*event);
    }
}

/// Writes each event as a debug log line.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    fn record(&mut self, event: &StepEvent) {
        debug!("{event}");
    }
}

impl<T: TraceSink + ?Sized> TraceSink for &mut T {
    fn record(&mut self, event: &StepEvent) {
        (**self).record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> StepEvent {
        StepEvent {
            cycle: 3,
            warrior: 1,
            task: 0,
            pc: 42,
            instruction: Instruction::empty(),
            next: Some(43),
            spawn: None,
            spawn_dropped: false,
        }
    }

    #[test]
    fn display_shows_flow() {
        assert_eq!(
            event().to_string(),
            "cycle 3 warrior 1 task 0 @00042: DAT.F #0, #0 -> 43"
        );
        let died = StepEvent {
            next: None,
            ..event()
        };
        assert!(died.to_string().ends_with("-> died"));
        let dropped = StepEvent {
            spawn: Some(7),
            spawn_dropped: true,
            ..event()
        };
        assert!(dropped.to_string().ends_with("-> 43, spawn 7 (dropped)"));
    }

    fn feed<T: TraceSink>(mut sink: T, event: &StepEvent) {
        sink.record(event);
    }

    #[test]
    fn recording_trace_keeps_order() {
        let mut trace = RecordingTrace::default();
        let first = event();
        let second = StepEvent { cycle: 4, ..event() };
        trace.record(&first);
        feed(&mut trace, &second);
        assert_eq!(trace.events, vec![first, second]);
    }
}
