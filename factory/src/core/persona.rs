//! Fixed persona registry.
//!
//! Personas are created once at startup and never mutated. Order matters: the
//! verifiers run in registry order and their reports are concatenated in that
//! order for the release manager.

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Pipeline stage a persona fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaRole {
    Specification,
    Developer,
    Verifier,
    ReleaseManager,
}

/// A named stage of the review pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: &'static str,
    pub role: PersonaRole,
    pub model: String,
    pub description: &'static str,
    pub instruction: &'static str,
}

struct PersonaDef {
    name: &'static str,
    role: PersonaRole,
    description: &'static str,
    instruction: &'static str,
}

const DEFINITIONS: &[PersonaDef] = &[
    PersonaDef {
        name: "eng_software",
        role: PersonaRole::Specification,
        description: "Decidir qual a melhor forma de desenvolver uma aplicação",
        instruction: include_str!("../prompts/eng_software.md"),
    },
    PersonaDef {
        name: "dev",
        role: PersonaRole::Developer,
        description: "Codificar a aplicação conforme instrução do engenheiro de software",
        instruction: include_str!("../prompts/dev.md"),
    },
    PersonaDef {
        name: "Revisor",
        role: PersonaRole::Verifier,
        description: "Revisar erros no código do desenvolvedor que impedem a compilação do mesmo",
        instruction: include_str!("../prompts/revisor.md"),
    },
    PersonaDef {
        name: "beta_tester",
        role: PersonaRole::Verifier,
        description: "Testar o código do desenvolvedor para procurar possíveis bugs e mal funcionamento",
        instruction: include_str!("../prompts/beta_tester.md"),
    },
    PersonaDef {
        name: "controle_qualidade",
        role: PersonaRole::Verifier,
        description: "Garantir que o usuário da aplicação recebida tenha uma boa experiência com o seu produto",
        instruction: include_str!("../prompts/controle_qualidade.md"),
    },
    PersonaDef {
        name: "gerente_lancamento",
        role: PersonaRole::ReleaseManager,
        description: "Gerente que decide se o software vai para produção.",
        instruction: include_str!("../prompts/gerente_lancamento.md"),
    },
];

/// Ordered, immutable set of personas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::with_model(DEFAULT_MODEL)
    }
}

impl PersonaRegistry {
    /// Build the standard pipeline with every persona bound to `model`.
    pub fn with_model(model: &str) -> Self {
        let personas = DEFINITIONS
            .iter()
            .map(|def| Persona {
                name: def.name,
                role: def.role,
                model: model.to_string(),
                description: def.description,
                instruction: def.instruction,
            })
            .collect();
        Self { personas }
    }

    pub fn all(&self) -> &[Persona] {
        &self.personas
    }

    pub fn by_name(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|persona| persona.name == name)
    }

    pub fn specification(&self) -> &Persona {
        self.first_with_role(PersonaRole::Specification)
    }

    pub fn developer(&self) -> &Persona {
        self.first_with_role(PersonaRole::Developer)
    }

    pub fn release_manager(&self) -> &Persona {
        self.first_with_role(PersonaRole::ReleaseManager)
    }

    /// Verifiers in invocation order.
    pub fn verifiers(&self) -> impl Iterator<Item = &Persona> {
        self.personas
            .iter()
            .filter(|persona| persona.role == PersonaRole::Verifier)
    }

    fn first_with_role(&self, role: PersonaRole) -> &Persona {
        self.personas
            .iter()
            .find(|persona| persona.role == role)
            .expect("DEFINITIONS covers every persona role")
    }
}
