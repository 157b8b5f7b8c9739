//! Marker protocol shared with the persona prompts.
//!
//! Personas answer in free text. Structure is recovered by locating literal
//! section markers that the instruction templates ask the model to emit. The
//! markers below must stay byte-identical to the ones in `src/prompts/`.

use std::sync::LazyLock;

use regex::Regex;

/// Header of the technical spec section emitted by the specification persona.
pub const SPEC_HEADER: &str = "--- ESPECIFICACAO TECNICA ---";
/// Header of the code section emitted by the developer persona.
pub const CODE_HEADER: &str = "--- CODIGO PYTHON ---";
/// Separator preceding the original client context in every sectioned response.
pub const CONTEXT_SEPARATOR: &str = "--- CONTEXTO ORIGINAL DO CLIENTE ---";
/// Verifier approval sentinel.
pub const APPROVAL_SENTINEL: &str = "STATUS: APROVADO";
/// Release manager termination sentinel.
pub const TERMINATION_SENTINEL: &str = "TERMINATE";
/// Substring that marks reference code as applicable in legacy developer inputs.
pub const APPLICABLE_MARKER: &str = "APLICÁVEL";

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:CÓDIGO DADO:|CÓDIGO BASE:)\s*(.*)").expect("reference marker regex")
});

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\w+#.-]*\s*|```").expect("code fence regex"));

/// A response split into its primary payload and the carried-over context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    pub primary: String,
    pub context: String,
}

/// Split `response` at the first occurrence of `separator`.
///
/// When present, `primary` is the text before the separator with `header`
/// removed and trimmed, and `context` is the separator followed by the trimmed
/// remainder. When absent the whole response is the primary payload and
/// `fallback_context` is carried through unchanged.
pub fn split_sections(
    response: &str,
    separator: &str,
    header: &str,
    fallback_context: &str,
) -> Sections {
    match response.split_once(separator) {
        Some((before, after)) => Sections {
            primary: before.replace(header, "").trim().to_string(),
            context: format!("{separator}{}", after.trim()),
        },
        None => Sections {
            primary: response.to_string(),
            context: fallback_context.to_string(),
        },
    }
}

/// Client request after reference-code extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    /// Free-form request text with the reference block removed.
    pub text: String,
    /// Reference code the developer should start from, if any.
    pub reference_code: Option<String>,
}

impl ClientRequest {
    pub fn has_reference(&self) -> bool {
        self.reference_code.is_some()
    }
}

/// Separate an embedded reference-code block from a human-submitted request.
///
/// Everything after a `CÓDIGO DADO:` / `CÓDIGO BASE:` marker (case-insensitive)
/// is treated as code. Markdown fences are stripped from the extracted block.
pub fn extract_reference_code(request: &str) -> ClientRequest {
    let Some(caps) = REFERENCE_RE.captures(request) else {
        return ClientRequest {
            text: request.to_string(),
            reference_code: None,
        };
    };
    let whole = caps.get(0).map_or("", |m| m.as_str());
    let body = caps.get(1).map_or("", |m| m.as_str()).trim();
    let code = FENCE_RE.replace_all(body, "").trim().to_string();
    let text = request.replace(whole, "").trim().to_string();

    ClientRequest {
        text,
        reference_code: (!code.is_empty()).then_some(code),
    }
}

pub fn is_approved(report: &str) -> bool {
    report.contains(APPROVAL_SENTINEL)
}

pub fn is_terminate(decision: &str) -> bool {
    decision.contains(TERMINATION_SENTINEL)
}

/// Manager feedback without the carried-over client context.
pub fn feedback_summary(decision: &str) -> &str {
    decision
        .split(CONTEXT_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim()
}

/// First segment of a verifier report, up to the first colon.
pub fn report_headline(report: &str) -> &str {
    report.split(':').next().unwrap_or_default()
}
