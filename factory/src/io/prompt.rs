//! Prompt rendering for persona invocations and stage inputs.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::persona::Persona;

const WORK_ITEM_TEMPLATE: &str = include_str!("../prompts/work_item.md");
const SPECIFICATION_INPUT_TEMPLATE: &str = include_str!("../prompts/specification_input.md");
const VERIFIER_INPUT_TEMPLATE: &str = include_str!("../prompts/verifier_input.md");
const MANAGER_INPUT_TEMPLATE: &str = include_str!("../prompts/manager_input.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("work_item", WORK_ITEM_TEMPLATE)
            .expect("work_item template should be valid");
        env.add_template("specification_input", SPECIFICATION_INPUT_TEMPLATE)
            .expect("specification_input template should be valid");
        env.add_template("verifier_input", VERIFIER_INPUT_TEMPLATE)
            .expect("verifier_input template should be valid");
        env.add_template("manager_input", MANAGER_INPUT_TEMPLATE)
            .expect("manager_input template should be valid");
        Self { env }
    }

    /// Full prompt sent to the model for one persona call.
    pub fn render_work_item(
        &self,
        persona: &Persona,
        input: &str,
        reference_code: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("work_item")?;
        let rendered = template.render(context! {
            name => persona.name,
            description => persona.description,
            instruction => persona.instruction,
            reference_code => reference_code.filter(|code| !code.trim().is_empty()),
            input => input,
        })?;
        Ok(rendered)
    }

    pub fn render_specification_input(&self, request: &str, has_reference: bool) -> Result<String> {
        let template = self.env.get_template("specification_input")?;
        Ok(template.render(context! { request => request, has_reference => has_reference })?)
    }

    pub fn render_verifier_input(&self, request: &str, artifact: &str) -> Result<String> {
        let template = self.env.get_template("verifier_input")?;
        Ok(template.render(context! { request => request, artifact => artifact })?)
    }

    /// Release manager input: verifier reports (newline-joined) plus carried context.
    pub fn render_manager_input(&self, reports: &[&str], context_text: &str) -> Result<String> {
        let template = self.env.get_template("manager_input")?;
        Ok(template.render(context! {
            reports => reports.join("\n"),
            context => context_text,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persona::PersonaRegistry;

    #[test]
    fn work_item_without_reference() {
        let engine = PromptEngine::new();
        let registry = PersonaRegistry::default();
        let persona = registry.by_name("Revisor").expect("persona");
        let rendered = engine
            .render_work_item(persona, "analise isto", None)
            .expect("render");
        assert!(rendered.starts_with(
            "Instrução do Agente 'Revisor' (Revisar erros no código do desenvolvedor que impedem a compilação do mesmo): "
        ));
        assert!(rendered.ends_with("\n\nENTRADA DE TRABALHO: analise isto"));
        assert!(!rendered.contains("CÓDIGO BASE NA MEMÓRIA"));
    }

    #[test]
    fn work_item_with_reference_block() {
        let engine = PromptEngine::new();
        let registry = PersonaRegistry::default();
        let rendered = engine
            .render_work_item(registry.developer(), "spec", Some("def add(a, b): return a + b"))
            .expect("render");
        assert!(rendered.contains(
            "\n\n🚨 CÓDIGO BASE NA MEMÓRIA (INÍCIO DO TRABALHO) 🚨\ndef add(a, b): return a + b\n🚨 CÓDIGO BASE NA MEMÓRIA (FIM DO TRABALHO) 🚨\nENTRADA DE TRABALHO: spec"
        ));
    }

    #[test]
    fn code_is_not_html_escaped() {
        let engine = PromptEngine::new();
        let rendered = engine
            .render_verifier_input("compare <a> & <b>", "if a < b and b > c: pass")
            .expect("render");
        assert_eq!(
            rendered,
            "Pedido do Cliente: compare <a> & <b>\n\nAnalise o seguinte código:\nif a < b and b > c: pass"
        );
    }

    #[test]
    fn specification_input_flags_reference_presence() {
        let engine = PromptEngine::new();
        assert_eq!(
            engine
                .render_specification_input("calculadora", true)
                .expect("render"),
            "PEDIDO TEXTUAL: calculadora\n\nStatus do Código Base: Presente"
        );
        assert!(
            engine
                .render_specification_input("calculadora", false)
                .expect("render")
                .ends_with("Ausente")
        );
    }

    #[test]
    fn manager_input_joins_reports() {
        let engine = PromptEngine::new();
        let rendered = engine
            .render_manager_input(&["r1", "r2", "r3"], "--- CONTEXTO ORIGINAL DO CLIENTE ---x")
            .expect("render");
        assert_eq!(
            rendered,
            "RELATÓRIOS DOS REVISORES:\nr1\nr2\nr3\n\nCONTEXTO NECESSÁRIO PARA O FEEDBACK:\n--- CONTEXTO ORIGINAL DO CLIENTE ---x"
        );
    }
}
