//! Persona invocation adapter.
//!
//! Wraps a [`ModelBackend`] so that a persona call always yields text. Failures
//! come back in-band as error sentinel strings and flow through the pipeline
//! like any other answer.

use std::time::Instant;

use tracing::{debug, info_span, warn};

use crate::core::persona::Persona;
use crate::io::backend::{GenerateRequest, ModelBackend, QuotaExceededError};
use crate::io::prompt::PromptEngine;

/// Sampling temperature for every call, so pass/fail decisions are reproducible.
pub const SAMPLING_TEMPERATURE: f32 = 0.0;

/// Prefix of every in-band invocation failure.
pub const ERROR_SENTINEL: &str = "ERRO DE EXECUÇÃO DO LLM PARA";

/// True when `text` is an in-band failure produced by [`PersonaInvoker::invoke`].
pub fn is_invocation_error(text: &str) -> bool {
    text.contains(ERROR_SENTINEL)
}

/// Invokes personas against a backend.
pub struct PersonaInvoker<B> {
    backend: B,
    prompts: PromptEngine,
}

impl<B: ModelBackend> PersonaInvoker<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            prompts: PromptEngine::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn prompts(&self) -> &PromptEngine {
        &self.prompts
    }

    /// Run `persona` on `input`, optionally prefixed with a reference-code block.
    ///
    /// Never fails: quota exhaustion and any other error are returned as
    /// sentinel text naming the persona.
    pub fn invoke(&self, persona: &Persona, input: &str, reference_code: Option<&str>) -> String {
        let span = info_span!("persona", name = persona.name, model = %persona.model);
        let _guard = span.enter();

        let prompt = match self.prompts.render_work_item(persona, input, reference_code) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %err, "failed to render work item");
                return format!("{ERROR_SENTINEL} {}: {err:#}", persona.name);
            }
        };

        let started = Instant::now();
        let request = GenerateRequest {
            model: &persona.model,
            prompt: &prompt,
            temperature: SAMPLING_TEMPERATURE,
        };
        match self.backend.generate(&request) {
            Ok(text) => {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    response_bytes = text.len(),
                    "persona responded"
                );
                text
            }
            Err(err) if err.downcast_ref::<QuotaExceededError>().is_some() => {
                warn!("persona call hit the quota limit");
                format!(
                    "{ERROR_SENTINEL} {}: Limite de quota excedido.",
                    persona.name
                )
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "persona call failed");
                format!("{ERROR_SENTINEL} {}: {err:#}", persona.name)
            }
        }
    }
}
