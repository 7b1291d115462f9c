//! # LLM Helpers
//!
//! Provider dispatch for one phase call. Each phase only names its output
//! type and system prompt; the macro picks the radkit provider, attaches
//! phase/provider/model context to failures and hands back the structured
//! output as JSON for the phase contract to parse.

/// Run a radkit `LlmFunction` typed on `$output_type` for `$phase`, using
/// the provider in a [`ModelConfig`](crate::models::ModelConfig).
///
/// Evaluates to `anyhow::Result<serde_json::Value>`. Must be used inside an
/// async function returning `anyhow::Result`.
#[macro_export]
macro_rules! run_phase_function {
    ($config:expr, $phase:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use anyhow::Context as _;
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config = $config;
        let phase = $phase;
        let provider = config.provider.display_name();
        let started = std::time::Instant::now();

        let output: anyhow::Result<$output_type> = match config.provider {
            LlmProvider::Anthropic => {
                let llm = AnthropicLlm::from_env(&config.model)
                    .with_context(|| format!("{} client for {} phase", provider, phase))?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::OpenAI => {
                let mut llm = OpenAILlm::from_env(&config.model)
                    .with_context(|| format!("{} client for {} phase", provider, phase))?;
                if let Some(base_url) = &config.base_url {
                    llm = llm.with_base_url(base_url);
                }
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::Gemini => {
                let llm = GeminiLlm::from_env(&config.model)
                    .with_context(|| format!("{} client for {} phase", provider, phase))?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::OpenRouter => {
                let llm = OpenRouterLlm::from_env(&config.model)
                    .with_context(|| format!("{} client for {} phase", provider, phase))?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::Grok => {
                let llm = GrokLlm::from_env(&config.model)
                    .with_context(|| format!("{} client for {} phase", provider, phase))?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::DeepSeek => {
                let llm = DeepSeekLlm::from_env(&config.model)
                    .with_context(|| format!("{} client for {} phase", provider, phase))?;
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
        };

        tracing::debug!(
            phase = %phase,
            provider,
            model = %config.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = output.is_ok(),
            "LLM call finished"
        );

        output
            .with_context(|| format!("{} phase call to {} ({})", phase, provider, config.model))
            .and_then(|output| serde_json::to_value(output).map_err(Into::into))
    }};
}
