//! Run state carried across events by the run control transitions.
//!
//! The decoders are stateless per event; this context belongs to the caller
//! and is updated from decoded control events.

use crate::types::{ControlEvent, ControlKind};

/// Current run as seen through prestart/go/pause/end events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunContext {
    pub run_number: u32,
    pub run_type: u32,
    pub prestart_time: Option<u32>,
    pub start_time: Option<u32>,
    pub end_time: Option<u32>,
    /// Event count reported by the most recent go, pause, sync or end.
    pub event_count: u32,
    pub pause_count: u32,
    pub running: bool,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one control event.
    pub fn apply(&mut self, event: &ControlEvent) {
        match event.kind {
            ControlKind::Prestart => {
                *self = Self {
                    run_number: event.run_number,
                    run_type: event.run_type,
                    prestart_time: Some(event.time),
                    ..Self::default()
                };
            }
            ControlKind::Go => {
                self.start_time.get_or_insert(event.time);
                self.event_count = event.event_count;
                self.running = true;
            }
            ControlKind::Pause => {
                self.event_count = event.event_count;
                self.pause_count += 1;
                self.running = false;
            }
            ControlKind::Sync => {
                self.event_count = event.event_count;
            }
            ControlKind::End => {
                self.end_time = Some(event.time);
                self.event_count = event.event_count;
                self.running = false;
            }
        }
    }

    /// Seconds between the first go and the end event.
    pub fn duration(&self) -> Option<u32> {
        Some(self.end_time?.saturating_sub(self.start_time?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(kind: ControlKind, time: u32, second: u32, third: u32) -> ControlEvent {
        ControlEvent::from_words(kind, [time, second, third])
    }

    #[test]
    fn test_run_sequence() {
        let mut ctx = RunContext::new();
        ctx.apply(&control(ControlKind::Prestart, 100, 1234, 5));
        assert_eq!(ctx.run_number, 1234);
        assert_eq!(ctx.run_type, 5);
        assert!(!ctx.running);

        ctx.apply(&control(ControlKind::Go, 110, 0, 0));
        assert!(ctx.running);
        ctx.apply(&control(ControlKind::Pause, 150, 0, 300));
        assert!(!ctx.running);
        ctx.apply(&control(ControlKind::Go, 160, 0, 300));
        ctx.apply(&control(ControlKind::End, 200, 0, 1000));

        assert_eq!(ctx.start_time, Some(110));
        assert_eq!(ctx.pause_count, 1);
        assert_eq!(ctx.event_count, 1000);
        assert_eq!(ctx.duration(), Some(90));
    }

    #[test]
    fn test_prestart_resets_previous_run() {
        let mut ctx = RunContext::new();
        ctx.apply(&control(ControlKind::Prestart, 1, 1, 0));
        ctx.apply(&control(ControlKind::Go, 2, 0, 0));
        ctx.apply(&control(ControlKind::End, 3, 0, 10));
        ctx.apply(&control(ControlKind::Prestart, 4, 2, 0));
        assert_eq!(ctx.run_number, 2);
        assert_eq!(ctx.end_time, None);
        assert_eq!(ctx.event_count, 0);
    }
}
