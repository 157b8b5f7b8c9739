//! Iterate-develop-verify-decide state machine.
//!
//! A run moves through `Specifying -> Developing -> Verifying -> Deciding` and
//! loops back to `Developing` with the release manager's feedback until the
//! manager emits the termination sentinel, the iteration bound is reached, or
//! cancellation is observed at the top of an iteration.
//!
//! The run is fully synchronous. Progress is pushed to the caller through
//! `on_event` after every discrete step; the state machine does not know how
//! the events are rendered.

use std::fmt;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::cancel::CancelToken;
use crate::core::language::{Language, infer_language};
use crate::core::persona::PersonaRegistry;
use crate::core::protocol::{
    APPLICABLE_MARKER, CODE_HEADER, CONTEXT_SEPARATOR, ClientRequest, SPEC_HEADER,
    feedback_summary, is_approved, is_terminate, report_headline, split_sections,
};
use crate::core::types::{
    FinishReason, IterationRecord, ProgressEvent, VerifierReport, WorkflowOutcome,
};
use crate::io::backend::ModelBackend;
use crate::io::config::ReferencePolicy;
use crate::io::invoker::{PersonaInvoker, is_invocation_error};

/// Artifact reported when no development iteration has completed.
pub const SEED_ARTIFACT: &str = "Nenhuma tentativa de código ainda.";

/// Input for one workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub client_request: ClientRequest,
    pub max_iterations: u32,
    pub reference_policy: ReferencePolicy,
}

/// The iteration bound must allow at least one development step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidIterationsError {
    pub max_iterations: u32,
}

impl fmt::Display for InvalidIterationsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_iterations must be > 0 (got {})",
            self.max_iterations
        )
    }
}

impl std::error::Error for InvalidIterationsError {}

/// Per-run mutable state. Owned exclusively by one run.
struct WorkflowContext<'a> {
    request: &'a WorkflowRequest,
    language: Language,
    iteration: u32,
    /// Text handed to the developer: the technical specification first, then manager feedback.
    developer_input: String,
    /// Original client context carried alongside the current artifact.
    original_context: String,
    artifact: String,
    history: Vec<IterationRecord>,
}

impl<'a> WorkflowContext<'a> {
    fn new(request: &'a WorkflowRequest, developer_input: String) -> Self {
        Self {
            request,
            language: infer_language(&request.client_request.text),
            iteration: 0,
            original_context: String::new(),
            developer_input,
            artifact: SEED_ARTIFACT.to_string(),
            history: Vec::new(),
        }
    }

    /// Reference code to inject into the next developer prompt, if applicable.
    fn developer_reference(&self) -> Option<&str> {
        let code = self.request.client_request.reference_code.as_deref()?;
        match self.request.reference_policy {
            ReferencePolicy::Explicit => Some(code),
            ReferencePolicy::Marker => self
                .developer_input
                .contains(APPLICABLE_MARKER)
                .then_some(code),
        }
    }

    fn outcome(self, reason: FinishReason) -> WorkflowOutcome {
        WorkflowOutcome {
            success: reason == FinishReason::Approved,
            reason,
            artifact: self.artifact,
            language: self.language,
            iterations_run: self.history.len() as u32,
            history: self.history,
        }
    }
}

/// Drive a complete workflow run.
///
/// Returns an error only for an invalid iteration bound or a prompt rendering
/// failure. Persona failures travel in-band as text.
#[instrument(skip_all, fields(max_iterations = request.max_iterations, has_reference = request.client_request.has_reference()))]
pub fn run_workflow<B: ModelBackend, F: FnMut(&ProgressEvent)>(
    invoker: &PersonaInvoker<B>,
    registry: &PersonaRegistry,
    request: &WorkflowRequest,
    cancel: &CancelToken,
    mut on_event: F,
) -> Result<WorkflowOutcome> {
    let max_iterations = request.max_iterations;
    if max_iterations == 0 {
        return Err(InvalidIterationsError { max_iterations }.into());
    }
    let client = &request.client_request;
    let prompts = invoker.prompts();

    // Specifying
    on_event(&ProgressEvent::Started {
        message: "1. Engenheiro gerando especificação técnica...".to_string(),
    });
    let spec_input = prompts.render_specification_input(&client.text, client.has_reference())?;
    let spec_response = invoker.invoke(registry.specification(), &spec_input, None);
    let spec = split_sections(&spec_response, CONTEXT_SEPARATOR, SPEC_HEADER, &spec_input);
    info!(spec_bytes = spec_response.len(), "specification ready");
    on_event(&ProgressEvent::SpecReady {
        message: "✅ Especificação gerada. Iniciando loop de desenvolvimento.".to_string(),
        spec: spec.primary,
    });

    let mut ctx = WorkflowContext::new(request, spec_response);

    for iteration in 1..=max_iterations {
        if cancel.take() {
            info!(iteration, "workflow aborted before iteration");
            return Ok(finish(
                ctx,
                FinishReason::Aborted,
                Some("🚫 Operação abortada pelo usuário.".to_string()),
                &mut on_event,
            ));
        }
        ctx.iteration = iteration;

        // Developing
        on_event(&ProgressEvent::IterationStarted {
            iteration,
            max_iterations,
            message: format!(
                "🔄 Iteração {iteration}/{max_iterations}: Desenvolvedor trabalhando..."
            ),
        });
        let dev_response = invoker.invoke(
            registry.developer(),
            &ctx.developer_input,
            ctx.developer_reference(),
        );
        let sections = split_sections(
            &dev_response,
            CONTEXT_SEPARATOR,
            CODE_HEADER,
            &ctx.developer_input,
        );
        if is_invocation_error(&dev_response) {
            warn!(iteration, "developer call failed; error text becomes the artifact");
        }
        ctx.artifact = sections.primary;
        ctx.original_context = sections.context;
        debug!(iteration, artifact_bytes = ctx.artifact.len(), "artifact updated");
        on_event(&ProgressEvent::DevDone {
            iteration,
            message: "🛠️ Código gerado. Rodando verificadores...".to_string(),
        });

        // Verifying
        let reports = verify(invoker, registry, &ctx, &mut on_event)?;
        let approvals = reports.iter().filter(|r| r.approved).count();
        info!(iteration, approvals, verifiers = reports.len(), "verifiers done");
        on_event(&ProgressEvent::VerifiersDone {
            iteration,
            approvals,
            verifiers: reports.len(),
            message: format!(
                "🔎 Análise concluída ({approvals}/{} aprovados). Gerente decidindo...",
                reports.len()
            ),
        });

        // Deciding
        let report_texts: Vec<&str> = reports.iter().map(|r| r.report.as_str()).collect();
        let manager_input = prompts.render_manager_input(&report_texts, &ctx.original_context)?;
        let decision = invoker.invoke(registry.release_manager(), &manager_input, None);
        let terminate = is_terminate(&decision);
        ctx.history.push(IterationRecord {
            iteration,
            artifact: ctx.artifact.clone(),
            reports,
            decision: decision.clone(),
        });

        if terminate {
            info!(iteration, "release manager approved");
            return Ok(finish(ctx, FinishReason::Approved, None, &mut on_event));
        }

        on_event(&ProgressEvent::Feedback {
            iteration,
            message: format!(
                "❌ Reprovado. Feedback enviado ao Dev:\n{}",
                feedback_summary(&decision)
            ),
        });
        ctx.developer_input = decision;
    }

    info!(max_iterations, "iteration bound reached without approval");
    Ok(finish(
        ctx,
        FinishReason::Exhausted,
        Some(format!(
            "Falha: Limite de {max_iterations} iterações atingido sem consenso."
        )),
        &mut on_event,
    ))
}

/// Run every verifier on the current artifact, in registry order.
fn verify<B: ModelBackend, F: FnMut(&ProgressEvent)>(
    invoker: &PersonaInvoker<B>,
    registry: &PersonaRegistry,
    ctx: &WorkflowContext<'_>,
    on_event: &mut F,
) -> Result<Vec<VerifierReport>> {
    let input = invoker
        .prompts()
        .render_verifier_input(&ctx.request.client_request.text, &ctx.artifact)?;
    let mut reports = Vec::new();
    for persona in registry.verifiers() {
        let report = invoker.invoke(persona, &input, None);
        let approved = is_approved(&report);
        let invocation_failed = is_invocation_error(&report);
        debug!(persona = persona.name, approved, invocation_failed, "verifier report");
        on_event(&ProgressEvent::Analysis {
            iteration: ctx.iteration,
            persona: persona.name.to_string(),
            approved,
            invocation_failed,
            message: format!("   -> {}: {}...", persona.name, report_headline(&report)),
        });
        reports.push(VerifierReport {
            persona: persona.name.to_string(),
            approved,
            report,
        });
    }
    Ok(reports)
}

fn finish<F: FnMut(&ProgressEvent)>(
    ctx: WorkflowContext<'_>,
    reason: FinishReason,
    message: Option<String>,
    on_event: &mut F,
) -> WorkflowOutcome {
    let outcome = ctx.outcome(reason);
    on_event(&ProgressEvent::Finished {
        success: outcome.success,
        reason,
        artifact: outcome.artifact.clone(),
        language: outcome.language,
        message,
    });
    outcome
}
