//! 应用配置：从配置文件与环境变量加载
//!
//! 加载顺序：默认配置文件（codebee_config.json / codebee.toml / config/default.toml 中第一个存在的），
//! 再叠加 `--config-file` 指定的文件，最后用环境变量 `CODEBEE__*` 覆盖
//! （双下划线表示嵌套，如 `CODEBEE__MODEL_PROVIDERS__OPENAI__MODEL=gpt-4.1`）。
//!
//! 各 Provider 的模型参数 = 内置默认值（API Key 取自环境变量）+ 配置文件中的逐字段覆盖。

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::Provider;
use crate::react::ReflectionMode;

/// 默认配置文件候选（按顺序取第一个存在的）
pub const DEFAULT_CONFIG_FILES: [&str; 3] =
    ["codebee_config.json", "codebee.toml", "config/default.toml"];

/// 应用配置根
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// 单个任务允许的最大步数
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub reflection: ReflectionMode,
    /// 单次工具调用的外层超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 按 Provider 名覆盖模型参数
    #[serde(default)]
    pub model_providers: HashMap<String, ModelParametersOverride>,
}

fn default_provider() -> String {
    Provider::Anthropic.to_string()
}

fn default_max_steps() -> usize {
    20
}

fn default_tool_timeout_secs() -> u64 {
    120
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            max_steps: default_max_steps(),
            reflection: ReflectionMode::default(),
            tool_timeout_secs: default_tool_timeout_secs(),
            model_providers: HashMap::new(),
        }
    }
}

/// 发给模型的调用参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_retries: u32,
    pub parallel_tool_calls: bool,
}

/// 配置文件中的逐字段覆盖，未出现的字段保留默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParametersOverride {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_retries: Option<u32>,
    pub parallel_tool_calls: Option<bool>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl ModelParameters {
    /// 各 Provider 的内置默认参数；API Key 与部分 base_url 来自环境变量
    pub fn defaults_for(provider: Provider) -> Self {
        let base = ModelParameters {
            model: String::new(),
            api_key: None,
            base_url: None,
            api_version: None,
            max_tokens: 4096,
            temperature: 0.5,
            top_p: 1.0,
            top_k: 0,
            max_retries: 10,
            parallel_tool_calls: true,
        };
        match provider {
            Provider::OpenAi => ModelParameters {
                model: "gpt-4o".into(),
                api_key: env_var("OPENAI_API_KEY"),
                ..base
            },
            Provider::Anthropic => ModelParameters {
                model: "claude-3-5-sonnet-20241022".into(),
                api_key: env_var("ANTHROPIC_API_KEY"),
                ..base
            },
            Provider::Azure => ModelParameters {
                model: "gpt-4o".into(),
                api_key: env_var("AZURE_API_KEY"),
                base_url: env_var("AZURE_BASE_URL"),
                api_version: Some("2024-03-01-preview".into()),
                ..base
            },
            Provider::OpenRouter => ModelParameters {
                model: "openai/gpt-4o".into(),
                api_key: env_var("OPENROUTER_API_KEY"),
                ..base
            },
            Provider::Doubao => ModelParameters {
                model: "doubao-seed-1.6".into(),
                api_key: env_var("DOUBAO_API_KEY"),
                base_url: env_var("DOUBAO_API_BASE_URL"),
                max_tokens: 8192,
                max_retries: 20,
                ..base
            },
            Provider::Ollama => ModelParameters {
                model: "llama3".into(),
                ..base
            },
        }
    }

    /// 逐字段应用覆盖
    pub fn apply_override(&mut self, o: &ModelParametersOverride) {
        if let Some(v) = &o.model {
            self.model = v.clone();
        }
        if let Some(v) = &o.api_key {
            self.api_key = Some(v.clone());
        }
        if let Some(v) = &o.base_url {
            self.base_url = Some(v.clone());
        }
        if let Some(v) = &o.api_version {
            self.api_version = Some(v.clone());
        }
        if let Some(v) = o.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = o.temperature {
            self.temperature = v;
        }
        if let Some(v) = o.top_p {
            self.top_p = v;
        }
        if let Some(v) = o.top_k {
            self.top_k = v;
        }
        if let Some(v) = o.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = o.parallel_tool_calls {
            self.parallel_tool_calls = v;
        }
    }

    /// 用于展示：API Key 只保留末 4 位
    pub fn masked(&self) -> Self {
        let mut shown = self.clone();
        shown.api_key = self.api_key.as_deref().map(mask_secret);
        shown
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        "****".to_string()
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}

impl AppConfig {
    /// 解析 default_provider
    pub fn provider(&self) -> Result<Provider, AgentError> {
        self.default_provider
            .parse()
            .map_err(AgentError::ConfigError)
    }

    /// 某 Provider 的最终参数：内置默认 + 配置覆盖
    pub fn model_parameters(&self, provider: Provider) -> ModelParameters {
        let mut params = ModelParameters::defaults_for(provider);
        if let Some(o) = self.model_providers.get(provider.as_str()) {
            params.apply_override(o);
        }
        params
    }

    /// 校验：default_provider 与 model_providers 的键必须是已知 Provider，max_steps > 0
    pub fn validate(&self) -> Result<(), AgentError> {
        self.provider()?;
        for name in self.model_providers.keys() {
            name.parse::<Provider>().map_err(AgentError::ConfigError)?;
        }
        if self.max_steps == 0 {
            return Err(AgentError::ConfigError("max_steps must be at least 1".into()));
        }
        Ok(())
    }
}

/// 加载配置
///
/// 1. 在当前目录按 DEFAULT_CONFIG_FILES 顺序查找，找到第一个即作为第一源
/// 2. 若传入 config_path，则必须存在，追加为第二源（覆盖前面的键）
/// 3. 最后叠加环境变量 CODEBEE__*
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, AgentError> {
    load_config_from(Path::new("."), config_path)
}

/// 同 load_config，但默认配置文件相对于 base_dir 查找
pub fn load_config_from(base_dir: &Path, config_path: Option<&Path>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    if let Some(found) = DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| base_dir.join(name))
        .find(|p| p.is_file())
    {
        tracing::debug!(path = %found.display(), "using default config file");
        builder = builder.add_source(config::File::from(found).required(false));
    }

    if let Some(path) = config_path {
        if !path.is_file() {
            return Err(AgentError::ConfigError(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CODEBEE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.max_steps, 20);
        assert_eq!(cfg.provider().unwrap(), Provider::Anthropic);
        assert_eq!(cfg.reflection, ReflectionMode::ToolErrors);
        let doubao = ModelParameters::defaults_for(Provider::Doubao);
        assert_eq!(doubao.max_tokens, 8192);
        assert_eq!(doubao.max_retries, 20);
    }

    #[test]
    fn test_override_is_field_by_field() {
        let mut cfg = AppConfig::default();
        cfg.model_providers.insert(
            "openai".into(),
            ModelParametersOverride {
                model: Some("gpt-4.1".into()),
                temperature: Some(0.0),
                ..Default::default()
            },
        );
        let params = cfg.model_parameters(Provider::OpenAi);
        assert_eq!(params.model, "gpt-4.1");
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.max_tokens, 4096);
        assert!(params.parallel_tool_calls);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let cfg = AppConfig {
            default_provider: "gemini".into(),
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
default_provider = "openai"
max_steps = 7
reflection = "model"

[model_providers.openai]
model = "gpt-4o-mini"
max_retries = 2
"#,
        )
        .unwrap();
        let cfg = load_config_from(dir.path(), Some(&path)).unwrap();
        assert_eq!(cfg.max_steps, 7);
        assert_eq!(cfg.reflection, ReflectionMode::Model);
        let params = cfg.model_parameters(cfg.provider().unwrap());
        assert_eq!(params.model, "gpt-4o-mini");
        assert_eq!(params.max_retries, 2);
        assert_eq!(params.top_p, 1.0);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config_from(dir.path(), Some(&missing)).is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("sk-abcdefghijkl"), "****ijkl");
    }
}
