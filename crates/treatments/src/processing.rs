//! Name-based dispatch to the processing providers.
//!
//! Algorithms are addressed as `provider:algorithm` (e.g.
//! `gdal:warpreproject`). The registry resolves the provider, reports the
//! invocation to the feedback sink and times the call. A start/end
//! notification pair is emitted for every invocation, the end notification
//! fires on every exit path.

use std::collections::BTreeMap;
use std::path::Path;

use inf::duration::Recorder;
use inf::Feedback;

use crate::parameters::{Outputs, ParamValue, Parameters};
use crate::{Error, Result};

pub trait Provider {
    fn name(&self) -> &'static str;
    fn run(&self, algorithm: &str, parameters: &Parameters, feedback: &dyn Feedback) -> Result<Outputs>;
}

struct JobGuard<'a> {
    feedback: &'a dyn Feedback,
    job: &'a str,
}

impl<'a> JobGuard<'a> {
    fn start(feedback: &'a dyn Feedback, job: &'a str) -> Self {
        feedback.job_started(job);
        JobGuard { feedback, job }
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.feedback.job_ended(self.job);
    }
}

#[derive(Default)]
pub struct Registry {
    providers: BTreeMap<&'static str, Box<dyn Provider>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registry with the built-in `gdal` and `native` providers
    pub fn with_default_providers() -> Self {
        let mut registry = Registry::new();
        registry.register(Box::new(crate::providers::gdalalg::GdalProvider));
        registry.register(Box::new(crate::providers::native::NativeProvider));
        registry
    }

    /// Registers a provider, replacing any previous one with the same name
    pub fn register(&mut self, provider: Box<dyn Provider>) {
        self.providers.insert(provider.name(), provider);
    }

    /// Runs `provider:algorithm` synchronously and returns the full output
    /// mapping. Delegate failures are logged with the algorithm name and
    /// propagated unchanged.
    pub fn run(&self, algorithm_id: &str, parameters: &Parameters, feedback: &dyn Feedback) -> Result<Outputs> {
        let (provider_name, algorithm) = algorithm_id
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("Malformed algorithm id: '{algorithm_id}'")))?;

        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown processing provider: '{provider_name}'")))?;

        feedback.push_debug(&format!("parameters: {parameters}"));
        feedback.push_info(&format!("Calling processing algorithm '{algorithm_id}'"));

        let _job = JobGuard::start(feedback, algorithm_id);
        let recorder = Recorder::new();
        match provider.run(algorithm, parameters, feedback) {
            Ok(outputs) => {
                feedback.push_info(&format!(
                    "Call to {algorithm} successful, performed in {}",
                    recorder.elapsed_time_string()
                ));
                Ok(outputs)
            }
            Err(err) => {
                log::warn!("Failed to call {algorithm}: {err}");
                Err(err)
            }
        }
    }

    /// Like [`Registry::run`], but returns only the conventional primary
    /// output value (`None` when the algorithm produced none)
    pub fn run_for_output(
        &self,
        algorithm_id: &str,
        parameters: &Parameters,
        feedback: &dyn Feedback,
    ) -> Result<Option<ParamValue>> {
        let outputs = self.run(algorithm_id, parameters, feedback)?;
        Ok(outputs.primary().cloned())
    }

    /// Convenience for algorithms whose primary output is a file path
    pub fn run_for_output_path(
        &self,
        algorithm_id: &str,
        parameters: &Parameters,
        feedback: &dyn Feedback,
    ) -> Result<std::path::PathBuf> {
        match self.run_for_output(algorithm_id, parameters, feedback)? {
            Some(value) => value
                .as_path()
                .map(Path::to_path_buf)
                .ok_or_else(|| Error::Internal(format!("'{algorithm_id}' did not produce a path output"))),
            None => Err(Error::Internal(format!("'{algorithm_id}' produced no output"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inf::feedback::{FeedbackEvent, RecordingFeedback};

    struct FakeProvider;

    impl Provider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn run(&self, algorithm: &str, parameters: &Parameters, _feedback: &dyn Feedback) -> Result<Outputs> {
            match algorithm {
                "echo" => Ok(Outputs::single(parameters.string("VALUE")?)),
                "legacy" => {
                    let mut outputs = Outputs::new();
                    outputs.insert("output", "legacy-artifact");
                    Ok(outputs)
                }
                "silent" => Ok(Outputs::new()),
                "boom" => Err(Error::Delegate {
                    algorithm: "boom".to_string(),
                    message: "engine exploded".to_string(),
                }),
                other => Err(Error::InvalidInput(format!("Unknown algorithm: 'fake:{other}'"))),
            }
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(Box::new(FakeProvider));
        registry
    }

    #[test]
    fn emits_exactly_one_start_end_pair_on_success() {
        let feedback = RecordingFeedback::new();
        let params = Parameters::new().set("VALUE", "42");
        registry().run("fake:echo", &params, &feedback).unwrap();
        assert_eq!(feedback.job_event_count("fake:echo"), (1, 1));
    }

    #[test]
    fn emits_exactly_one_start_end_pair_when_the_delegate_fails() {
        let feedback = RecordingFeedback::new();
        let err = registry().run("fake:boom", &Parameters::new(), &feedback).unwrap_err();
        assert!(matches!(err, Error::Delegate { .. }));
        assert_eq!(feedback.job_event_count("fake:boom"), (1, 1));

        // the end notification is the last job event
        let events = feedback.events();
        let last_job_event = events
            .iter()
            .rev()
            .find(|e| matches!(e, FeedbackEvent::JobStarted(_) | FeedbackEvent::JobEnded(_)))
            .unwrap();
        assert_eq!(*last_job_event, FeedbackEvent::JobEnded("fake:boom".into()));
    }

    #[test]
    fn no_notifications_without_a_resolved_algorithm() {
        let feedback = RecordingFeedback::new();
        assert!(matches!(
            registry().run("fake", &Parameters::new(), &feedback),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            registry().run("nope:echo", &Parameters::new(), &feedback),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(feedback.job_event_count("fake"), (0, 0));
    }

    #[test]
    fn run_for_output_falls_back_to_the_lowercase_key() {
        let feedback = RecordingFeedback::new();
        let params = Parameters::new().set("VALUE", "42");
        let output = registry().run_for_output("fake:echo", &params, &feedback).unwrap();
        assert_eq!(output, Some(ParamValue::Str("42".into())));

        let output = registry().run_for_output("fake:legacy", &Parameters::new(), &feedback).unwrap();
        assert_eq!(output, Some(ParamValue::Str("legacy-artifact".into())));

        let output = registry().run_for_output("fake:silent", &Parameters::new(), &feedback).unwrap();
        assert_eq!(output, None);
    }
}
