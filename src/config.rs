//! Configuration types for a resume-polish run.
//!
//! Everything that changes how a run behaves lives in [`PipelineConfig`],
//! built through [`PipelineConfigBuilder`]. Credentials are loaded once into
//! an [`LlmSettings`] value and handed to the backend that needs them; no
//! stage reads the process environment on its own.

use crate::error::ResumeError;
use crate::pipeline::llm::CompletionBackend;
use crate::pipeline::render::fonts::FontChain;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
/// Default model identifier for [`DEFAULT_BASE_URL`].
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Credentials and endpoint for the OpenAI-compatible backend.
#[derive(Clone, PartialEq)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl LlmSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Load settings from the process environment.
    ///
    /// | Setting  | Variables (first non-empty wins)          | Default |
    /// |----------|-------------------------------------------|---------|
    /// | api key  | `DEEPSEEK_API_KEY`, `OPENAI_API_KEY`      | required |
    /// | base url | `DEEPSEEK_BASE_URL`, `OPENAI_BASE_URL`    | [`DEFAULT_BASE_URL`] |
    /// | model    | `DEEPSEEK_MODEL`                          | [`DEFAULT_MODEL`] |
    pub fn from_env() -> Result<Self, ResumeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LlmSettings::from_env`] with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ResumeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(*k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let api_key = first(&["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]).ok_or_else(|| {
            ResumeError::ProviderNotConfigured {
                provider: "openai-compatible".to_string(),
                hint: "Set DEEPSEEK_API_KEY (recommended) or OPENAI_API_KEY.".to_string(),
            }
        })?;

        Ok(Self {
            api_key,
            base_url: first(&["DEEPSEEK_BASE_URL", "OPENAI_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: first(&["DEEPSEEK_MODEL"]).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use resume_polish::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .model("deepseek-chat")
///     .temperature(0.3)
///     .output_dir("out")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 4096);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Model override. Applied on top of [`LlmSettings::model`] or passed to
    /// the provider factory when `provider_name` is set.
    pub model: Option<String>,

    /// Named provider (e.g. "openai", "anthropic", "ollama") resolved through
    /// `edgequake_llm::ProviderFactory`. Takes precedence over `llm`.
    pub provider_name: Option<String>,

    /// Pre-constructed backend. Takes precedence over everything else.
    pub backend: Option<Arc<dyn CompletionBackend>>,

    /// Explicit OpenAI-compatible settings. If `None` (and no backend or
    /// provider name is given), [`LlmSettings::from_env`] is used.
    pub llm: Option<LlmSettings>,

    /// Sampling temperature. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 4096.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Directory for derived output paths. Default: `output`.
    pub output_dir: PathBuf,

    /// Font file tried first by the renderer's font chain.
    pub font_path: Option<PathBuf>,

    /// Replaces the renderer's system font chain (and `font_path`).
    pub font_chain: Option<FontChain>,

    /// Run the markdown clean-up rules on the rewritten resume. Default: true.
    pub clean_output: bool,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            backend: None,
            llm: None,
            temperature: 0.7,
            max_tokens: 4096,
            api_timeout_secs: 120,
            output_dir: PathBuf::from("output"),
            font_path: None,
            font_chain: None,
            clean_output: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("llm", &self.llm)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("output_dir", &self.output_dir)
            .field("font_path", &self.font_path)
            .field("font_chain", &self.font_chain)
            .field("clean_output", &self.clean_output)
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn llm(mut self, settings: LlmSettings) -> Self {
        self.config.llm = Some(settings);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn font_chain(mut self, chain: FontChain) -> Self {
        self.config.font_chain = Some(chain);
        self
    }

    pub fn clean_output(mut self, v: bool) -> Self {
        self.config.clean_output = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ResumeError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ResumeError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ResumeError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(ref llm) = c.llm {
            if !(llm.base_url.starts_with("http://") || llm.base_url.starts_with("https://")) {
                return Err(ResumeError::InvalidConfig(format!(
                    "base URL must start with http:// or https://, got '{}'",
                    llm.base_url
                )));
            }
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(ResumeError::InvalidConfig("output_dir must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = LlmSettings::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert!(err.to_string().contains("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        assert!(LlmSettings::from_lookup(lookup(&[("DEEPSEEK_API_KEY", "  ")])).is_err());
    }

    #[test]
    fn deepseek_variables_win_over_openai() {
        let s = LlmSettings::from_lookup(lookup(&[
            ("DEEPSEEK_API_KEY", "sk-ds"),
            ("OPENAI_API_KEY", "sk-oa"),
            ("OPENAI_BASE_URL", "https://api.openai.com/v1"),
        ]))
        .unwrap();
        assert_eq!(s.api_key, "sk-ds");
        assert_eq!(s.base_url, "https://api.openai.com/v1");
        assert_eq!(s.model, DEFAULT_MODEL);
    }

    #[test]
    fn openai_key_alone_uses_defaults() {
        let s = LlmSettings::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-oa")])).unwrap();
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
        assert_eq!(s.model, DEFAULT_MODEL);
    }

    #[test]
    fn debug_redacts_api_key() {
        let s = LlmSettings::new("sk-secret");
        assert!(!format!("{s:?}").contains("sk-secret"));
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = PipelineConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_bad_base_url() {
        let err = PipelineConfig::builder()
            .llm(LlmSettings::new("k").base_url("api.deepseek.com"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("base URL"));
    }

    #[test]
    fn builder_rejects_zero_max_tokens() {
        assert!(PipelineConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn from_env_reads_process_environment() {
        temp_env::with_vars(
            [
                ("DEEPSEEK_API_KEY", Some("sk-env")),
                ("OPENAI_API_KEY", None),
                ("DEEPSEEK_BASE_URL", None),
                ("OPENAI_BASE_URL", None),
                ("DEEPSEEK_MODEL", Some("deepseek-reasoner")),
            ],
            || {
                let s = LlmSettings::from_env().unwrap();
                assert_eq!(s.api_key, "sk-env");
                assert_eq!(s.base_url, DEFAULT_BASE_URL);
                assert_eq!(s.model, "deepseek-reasoner");
            },
        );
    }

    #[test]
    fn from_env_without_keys_fails() {
        temp_env::with_vars_unset(["DEEPSEEK_API_KEY", "OPENAI_API_KEY"], || {
            assert!(LlmSettings::from_env().is_err());
        });
    }
}
