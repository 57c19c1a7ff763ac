//! One request per call; failures become [`TRANSLATION_FAILED`] so a batch keeps going.

use crate::models::{DispatchError, GenerationConfig, TextBackend};
use crate::progress::ConsoleProgress;
use crate::prompt::{RenderedPrompt, Transcript};
use crate::sentinels::TRANSLATION_FAILED;

pub struct Dispatcher<'a> {
    progress: &'a ConsoleProgress,
}

impl<'a> Dispatcher<'a> {
    pub fn new(progress: &'a ConsoleProgress) -> Self {
        Self { progress }
    }

    /// Render `transcript` in the backend's format and send it.
    pub fn try_translate(
        &self,
        backend: &dyn TextBackend,
        transcript: &Transcript,
        cfg: &GenerationConfig,
    ) -> Result<String, DispatchError> {
        let prompt = backend.format().render(transcript);
        backend.generate(&prompt, cfg)
    }

    /// Send an already-flattened prompt.
    pub fn try_translate_flat(
        &self,
        backend: &dyn TextBackend,
        flat_prompt: &str,
        cfg: &GenerationConfig,
    ) -> Result<String, DispatchError> {
        backend.generate(&RenderedPrompt::Text(flat_prompt.to_string()), cfg)
    }

    pub fn translate(
        &self,
        backend: &dyn TextBackend,
        transcript: &Transcript,
        cfg: &GenerationConfig,
    ) -> String {
        let result = self.try_translate(backend, transcript, cfg);
        self.or_sentinel(backend, result)
    }

    pub fn translate_flat(
        &self,
        backend: &dyn TextBackend,
        flat_prompt: &str,
        cfg: &GenerationConfig,
    ) -> String {
        let result = self.try_translate_flat(backend, flat_prompt, cfg);
        self.or_sentinel(backend, result)
    }

    fn or_sentinel(&self, backend: &dyn TextBackend, result: Result<String, DispatchError>) -> String {
        result.unwrap_or_else(|err| {
            self.report_failure(backend, &err);
            TRANSLATION_FAILED.to_string()
        })
    }

    pub fn report_failure(&self, backend: &dyn TextBackend, err: &DispatchError) {
        self.progress.warn(format!(
            "{} call failed ({}): {err}",
            backend.name(),
            if err.is_retryable() { "retryable" } else { "fatal" }
        ));
    }
}
