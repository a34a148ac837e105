//! CLI configuration: collaborator selection plus the compliance settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use regwatch_compliance::ComplianceConfig;
use regwatch_embed::{EmbedConfig, Embedder, HashEmbedder, OpenAI};
use regwatch_judge::{Judge, OpenAIJudge, OpenAIJudgeConfig};
use serde::Deserialize;

const CONFIG_FILE: &str = "config.yaml";
const DATA_DIR: &str = ".regwatch";
const DB_FILE: &str = "regwatch.redb";
const DEFAULT_HASH_DIMENSION: usize = 256;

/// Configuration file format.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub embedder: EmbedderConfig,
    pub judge: Option<JudgeConfig>,
    pub compliance: ComplianceConfig,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Offline feature hashing; useful for demos and tests.
    #[default]
    Hash,
    /// Any OpenAI-compatible embeddings endpoint.
    OpenAI,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub provider: Provider,
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub base_url: Option<String>,
    /// May reference environment variables, e.g. `$OPENAI_API_KEY`.
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
}

impl CliConfig {
    /// Loads the config at `path`, or the default file when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match home_dir() {
                Some(dir) if dir.join(CONFIG_FILE).exists() => dir.join(CONFIG_FILE),
                _ => return Ok(Self::default()),
            },
        };

        let data =
            std::fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let cfg: CliConfig = match ext {
            "json" => serde_json::from_slice(&data)?,
            "yaml" | "yml" => serde_yaml::from_slice(&data)?,
            _ => bail!("unsupported config format: {}", path.display()),
        };
        cfg.compliance.validate()?;
        Ok(cfg)
    }

    /// Resolves the state directory: flag, then config, then ~/.regwatch.
    pub fn data_dir(&self, flag: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = flag.or(self.data_dir.as_deref()) {
            return Ok(dir.to_path_buf());
        }
        home_dir().context("cannot determine home directory")
    }

    /// Path of the redb state database, creating its directory.
    pub fn db_path(&self, flag: Option<&Path>) -> Result<PathBuf> {
        let dir = self.data_dir(flag)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create data dir {}", dir.display()))?;
        Ok(dir.join(DB_FILE))
    }

    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let e = &self.embedder;
        match e.provider {
            Provider::Hash => Ok(Arc::new(HashEmbedder::new(
                e.dimension.unwrap_or(DEFAULT_HASH_DIMENSION),
            ))),
            Provider::OpenAI => {
                let api_key = resolve_key(e.api_key.as_deref(), "OPENAI_API_KEY");
                if api_key.is_empty() {
                    bail!("embedder api_key is required for the openai provider");
                }
                let mut cfg = EmbedConfig::default();
                if let Some(model) = &e.model {
                    cfg = cfg.with_model(model);
                }
                if let Some(dim) = e.dimension {
                    cfg = cfg.with_dimension(dim);
                }
                if let Some(url) = &e.base_url {
                    cfg = cfg.with_base_url(&expand_env(url));
                }
                Ok(Arc::new(OpenAI::with_config(&api_key, cfg)))
            }
        }
    }

    pub fn build_judge(&self) -> Result<Option<Arc<dyn Judge>>> {
        let Some(j) = &self.judge else {
            return Ok(None);
        };
        let api_key = resolve_key(j.api_key.as_deref(), "OPENAI_API_KEY");
        if api_key.is_empty() {
            bail!("judge api_key is required");
        }
        Ok(Some(Arc::new(OpenAIJudge::new(OpenAIJudgeConfig {
            api_key,
            model: j.model.clone().unwrap_or_default(),
            base_url: j.base_url.as_deref().map(expand_env).unwrap_or_default(),
            temperature: j.temperature,
        }))))
    }
}

fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(DATA_DIR))
}

fn resolve_key(configured: Option<&str>, fallback_var: &str) -> String {
    match configured {
        Some(key) => expand_env(key),
        None => std::env::var(fallback_var).unwrap_or_default(),
    }
}

/// Expands `$VAR` and `${VAR}` references. `$$` is a literal dollar.
/// Unset variables expand to an empty string.
pub fn expand_env(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if closed {
                    out.push_str(&std::env::var(&name).unwrap_or_default());
                } else {
                    out.push_str("${");
                    out.push_str(&name);
                }
            }
            Some(n) if n.is_ascii_alphabetic() || *n == '_' => {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if !(n.is_ascii_alphanumeric() || n == '_') {
                        break;
                    }
                    name.push(n);
                    chars.next();
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }
    out
}
