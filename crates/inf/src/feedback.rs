//! Progress and message sink for long running operations.
//!
//! Operations report informational/debug messages and job boundaries through
//! a [`Feedback`] implementation. The sink is purely observational, it has no
//! control-flow effect on the operation that writes to it.

use std::sync::Mutex;

pub trait Feedback {
    fn push_info(&self, message: &str);
    fn push_debug(&self, message: &str);
    fn push_warning(&self, message: &str);
    /// Label for the currently running sub task
    fn set_sub_text(&self, _text: &str) {}
    fn set_progress(&self, _fraction: f64) {}
    fn job_started(&self, job: &str);
    fn job_ended(&self, job: &str);
}

/// Forwards all feedback to the `log` macros
#[derive(Default, Clone, Copy)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn push_info(&self, message: &str) {
        log::info!("{message}");
    }

    fn push_debug(&self, message: &str) {
        log::debug!("{message}");
    }

    fn push_warning(&self, message: &str) {
        log::warn!("{message}");
    }

    fn set_sub_text(&self, text: &str) {
        log::info!("-- {text}");
    }

    fn job_started(&self, job: &str) {
        log::debug!("Start job: {job}");
    }

    fn job_ended(&self, job: &str) {
        log::debug!("End job: {job}");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackEvent {
    Info(String),
    Debug(String),
    Warning(String),
    SubText(String),
    Progress(f64),
    JobStarted(String),
    JobEnded(String),
}

/// Accumulates every feedback event, mainly useful in tests and for
/// presenting an operation log afterwards
#[derive(Default)]
pub struct RecordingFeedback {
    events: Mutex<Vec<FeedbackEvent>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FeedbackEvent> {
        self.events.lock().expect("feedback mutex poisoned").clone()
    }

    pub fn job_event_count(&self, job: &str) -> (usize, usize) {
        let events = self.events();
        let started = events
            .iter()
            .filter(|e| matches!(e, FeedbackEvent::JobStarted(name) if name == job))
            .count();
        let ended = events
            .iter()
            .filter(|e| matches!(e, FeedbackEvent::JobEnded(name) if name == job))
            .count();
        (started, ended)
    }

    fn push(&self, event: FeedbackEvent) {
        self.events.lock().expect("feedback mutex poisoned").push(event);
    }
}

impl Feedback for RecordingFeedback {
    fn push_info(&self, message: &str) {
        self.push(FeedbackEvent::Info(message.to_string()));
    }

    fn push_debug(&self, message: &str) {
        self.push(FeedbackEvent::Debug(message.to_string()));
    }

    fn push_warning(&self, message: &str) {
        self.push(FeedbackEvent::Warning(message.to_string()));
    }

    fn set_sub_text(&self, text: &str) {
        self.push(FeedbackEvent::SubText(text.to_string()));
    }

    fn set_progress(&self, fraction: f64) {
        self.push(FeedbackEvent::Progress(fraction));
    }

    fn job_started(&self, job: &str) {
        self.push(FeedbackEvent::JobStarted(job.to_string()));
    }

    fn job_ended(&self, job: &str) {
        self.push(FeedbackEvent::JobEnded(job.to_string()));
    }
}
