//! Test-only scripted model backend.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::io::backend::{GenerateRequest, ModelBackend, QuotaExceededError};

/// Canned outcome for one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Text(String),
    Quota,
    Fail(String),
}

impl ScriptedReply {
    pub fn text(text: &str) -> Self {
        ScriptedReply::Text(text.to_string())
    }
}

/// A call observed by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Persona name parsed from the work item header.
    pub persona: String,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
}

type Responder = Box<dyn Fn(&str, &str) -> ScriptedReply + Send + Sync>;

enum Script {
    Queue(VecDeque<ScriptedReply>),
    Responder(Responder),
}

/// Backend that replays scripted replies and records every prompt.
pub struct ScriptedBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    /// Replies are consumed in call order; running out is an error.
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(Script::Queue(replies.into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply by inspecting `(persona_name, prompt)` of each call.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> ScriptedReply + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(Script::Responder(Box::new(responder))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Persona names in call order.
    pub fn persona_sequence(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.persona).collect()
    }
}

impl ModelBackend for ScriptedBackend {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        let persona = persona_from_prompt(request.prompt).to_string();
        self.calls.lock().expect("calls lock").push(RecordedCall {
            persona: persona.clone(),
            model: request.model.to_string(),
            prompt: request.prompt.to_string(),
            temperature: request.temperature,
        });

        let reply = match &mut *self.script.lock().expect("script lock") {
            Script::Queue(queue) => queue
                .pop_front()
                .ok_or_else(|| anyhow!("scripted backend exhausted at {persona}"))?,
            Script::Responder(responder) => responder(&persona, request.prompt),
        };

        match reply {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Quota => Err(anyhow!(QuotaExceededError {
                detail: "scripted quota".to_string(),
            })),
            ScriptedReply::Fail(detail) => Err(anyhow!(detail)),
        }
    }
}

fn persona_from_prompt(prompt: &str) -> &str {
    prompt
        .strip_prefix("Instrução do Agente '")
        .and_then(|rest| rest.split('\'').next())
        .unwrap_or_default()
}
