use std::{fmt, str::FromStr};

use thiserror::Error;

/// OpenAI-compatible chat-completions backends the monitor can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Groq,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-3.5-turbo",
            Provider::Groq => "llama-3.1-8b-instant",
        }
    }

    /// Conventional environment variable holding the provider API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelRefParseError {
    #[error("missing model identifier")]
    MissingModel,
    #[error("unsupported provider '{0}'. Supported providers: openai, groq")]
    UnsupportedProvider(String),
}

impl FromStr for Provider {
    type Err = ModelRefParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "groq" => Ok(Provider::Groq),
            _ => Err(ModelRefParseError::UnsupportedProvider(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: Provider,
    pub model: String,
}

impl ModelRef {
    /// Parses `provider/model`; a bare model name uses `default_provider`.
    pub fn parse(input: &str, default_provider: Provider) -> Result<Self, ModelRefParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ModelRefParseError::MissingModel);
        }

        if let Some((provider, model)) = trimmed.split_once('/') {
            if let Ok(provider) = Provider::from_str(provider) {
                let model = model.trim();
                if model.is_empty() {
                    return Err(ModelRefParseError::MissingModel);
                }
                return Ok(Self {
                    provider,
                    model: model.to_string(),
                });
            }
        }

        Ok(Self {
            provider: default_provider,
            model: trimmed.to_string(),
        })
    }

    pub fn provider_default(provider: Provider) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{ModelRef, ModelRefParseError, Provider};

    #[test]
    fn unit_parses_provider_prefixed_models() {
        let parsed = ModelRef::parse("groq/llama-3.3-70b-versatile", Provider::OpenAi)
            .expect("valid model ref");
        assert_eq!(parsed.provider, Provider::Groq);
        assert_eq!(parsed.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn unit_bare_model_uses_default_provider() {
        let parsed = ModelRef::parse("gpt-4o-mini", Provider::Groq).expect("valid model ref");
        assert_eq!(parsed.provider, Provider::Groq);
        assert_eq!(parsed.model, "gpt-4o-mini");
    }

    #[test]
    fn regression_unknown_prefix_is_kept_as_part_of_model_name() {
        let parsed =
            ModelRef::parse("meta-llama/llama-4-scout", Provider::Groq).expect("valid model ref");
        assert_eq!(parsed.provider, Provider::Groq);
        assert_eq!(parsed.model, "meta-llama/llama-4-scout");
    }

    #[test]
    fn unit_rejects_empty_input_and_unknown_provider_names() {
        assert_eq!(
            ModelRef::parse("  ", Provider::Groq),
            Err(ModelRefParseError::MissingModel)
        );
        assert_eq!(
            ModelRef::parse("openai/", Provider::Groq),
            Err(ModelRefParseError::MissingModel)
        );
        assert!(Provider::from_str("bedrock").is_err());
    }

    #[test]
    fn unit_provider_defaults_match_hosted_endpoints() {
        let groq = ModelRef::provider_default(Provider::Groq);
        assert_eq!(groq.model, "llama-3.1-8b-instant");
        assert_eq!(
            Provider::Groq.default_api_base(),
            "https://api.groq.com/openai/v1"
        );
        assert_eq!(Provider::OpenAi.api_key_env(), "OPENAI_API_KEY");
    }
}
