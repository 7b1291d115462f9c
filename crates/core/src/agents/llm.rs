//! # LLM Collaborator
//!
//! Answers every phase with a radkit `LlmFunction` whose structured output is
//! the phase's output type. Model selection is per phase, resolved from
//! [`ModelSettings`].

use async_trait::async_trait;
use serde_json::Value;

use super::{AgentRequest, Collaborator};
use crate::models::ModelSettings;
use crate::phases::{
    ChallengeOutput, DecompositionOutput, DesignOutput, DiscoveryOutput, PhaseName,
    SynthesisOutput, ValidationOutput,
};
use crate::run_phase_function;

const DISCOVERY_PROMPT: &str = include_str!("defaults/discovery.md");
const CHALLENGE_PROMPT: &str = include_str!("defaults/challenge.md");
const DESIGN_PROMPT: &str = include_str!("defaults/design.md");
const DECOMPOSITION_PROMPT: &str = include_str!("defaults/decomposition.md");
const VALIDATION_PROMPT: &str = include_str!("defaults/validation.md");
const SYNTHESIS_PROMPT: &str = include_str!("defaults/synthesis.md");

/// Collaborator backed by hosted LLMs
#[derive(Debug, Clone, Default)]
pub struct LlmCollaborator {
    models: ModelSettings,
}

impl LlmCollaborator {
    pub fn new(models: ModelSettings) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &ModelSettings {
        &self.models
    }
}

#[async_trait]
impl Collaborator for LlmCollaborator {
    async fn invoke(&self, request: AgentRequest) -> anyhow::Result<Value> {
        let config = self.models.for_phase(request.phase);
        let prompt = render_prompt(&request)?;

        tracing::debug!(
            phase = %request.phase,
            provider = config.provider.display_name(),
            model = %config.model,
            attempt = request.attempt,
            "Calling LLM"
        );

        let phase = request.phase;
        match phase {
            PhaseName::Discovery => {
                run_phase_function!(&config, phase, DiscoveryOutput, DISCOVERY_PROMPT, prompt)
            }
            PhaseName::Challenge => {
                run_phase_function!(&config, phase, ChallengeOutput, CHALLENGE_PROMPT, prompt)
            }
            PhaseName::Design => {
                run_phase_function!(&config, phase, DesignOutput, DESIGN_PROMPT, prompt)
            }
            PhaseName::Decomposition => run_phase_function!(
                &config,
                phase,
                DecompositionOutput,
                DECOMPOSITION_PROMPT,
                prompt
            ),
            PhaseName::Validation => {
                run_phase_function!(&config, phase, ValidationOutput, VALIDATION_PROMPT, prompt)
            }
            PhaseName::Synthesis => {
                run_phase_function!(&config, phase, SynthesisOutput, SYNTHESIS_PROMPT, prompt)
            }
        }
    }
}

/// User message for a phase: a short header plus the request payload
fn render_prompt(request: &AgentRequest) -> anyhow::Result<String> {
    let payload = serde_json::to_string_pretty(&request.payload)?;
    let mut prompt = format!(
        "Phase: {}\nIteration: {}\n",
        request.phase, request.iteration
    );
    if request.attempt > 1 {
        prompt.push_str(&format!(
            "Attempt: {} (the previous answer was rejected; follow the output schema exactly)\n",
            request.attempt
        ));
    }
    prompt.push_str("\nInput:\n");
    prompt.push_str(&payload);
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LlmProvider;

    fn request(attempt: u32) -> AgentRequest {
        AgentRequest {
            run_id: "run".into(),
            phase: PhaseName::Design,
            iteration: 2,
            attempt,
            payload: serde_json::json!({ "description": "A todo app" }),
        }
    }

    #[test]
    fn test_render_prompt() {
        let prompt = render_prompt(&request(1)).unwrap();
        assert!(prompt.starts_with("Phase: design\nIteration: 2\n"));
        assert!(prompt.contains("\"description\": \"A todo app\""));
        assert!(!prompt.contains("Attempt:"));

        let retry = render_prompt(&request(3)).unwrap();
        assert!(retry.contains("Attempt: 3"));
    }

    #[test]
    fn test_prompts_are_bundled() {
        for prompt in [
            DISCOVERY_PROMPT,
            CHALLENGE_PROMPT,
            DESIGN_PROMPT,
            DECOMPOSITION_PROMPT,
            VALIDATION_PROMPT,
            SYNTHESIS_PROMPT,
        ] {
            assert!(prompt.contains("JSON"));
        }
    }

    #[test]
    fn test_models_resolve_per_phase() {
        let mut settings = ModelSettings::default();
        settings
            .per_phase_providers
            .insert(PhaseName::Validation, LlmProvider::OpenAI);
        let collaborator = LlmCollaborator::new(settings);
        assert_eq!(
            collaborator.models().for_phase(PhaseName::Validation).provider,
            LlmProvider::OpenAI
        );
    }

    #[tokio::test]
    async fn test_failed_call_names_phase_and_provider() {
        if std::env::var("DEEPSEEK_API_KEY").is_ok() {
            return;
        }
        let settings = ModelSettings {
            global_provider: LlmProvider::DeepSeek,
            ..Default::default()
        };
        let collaborator = LlmCollaborator::new(settings);

        let err = collaborator.invoke(request(1)).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("design"), "{message}");
        assert!(message.contains("DeepSeek"), "{message}");
    }
}
