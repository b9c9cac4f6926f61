use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub data: DataConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunking.chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunking.overlap ({overlap}) must be smaller than chunking.chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("{backend} backend requires {field}")]
    MissingField {
        backend: &'static str,
        field: &'static str,
    },

    #[error("unknown {kind} backend '{name}'")]
    UnknownBackend { kind: &'static str, name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "ServerConfig::default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    fn default_bind_addr() -> String {
        "0.0.0.0:3000".to_string()
    }

    fn default_max_upload_bytes() -> usize {
        20 * 1024 * 1024
    }

    pub fn with_env_overrides(&self) -> Self {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| self.bind_addr.clone());
        Self {
            bind_addr,
            ..self.clone()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: Self::default_bind_addr(),
            max_upload_bytes: Self::default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
    pub base_url: Option<String>,
    pub batch_size: Option<usize>,
}

impl EmbeddingConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 64;

    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(Self::DEFAULT_BATCH_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub primary: String,
    pub fallback: String,
    pub base_url: Option<String>,
    pub aws_region: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    pub fn with_env_overrides(&self) -> Self {
        let primary = env::var("LLM_PRIMARY_MODEL").unwrap_or_else(|_| self.primary.clone());
        let fallback = env::var("LLM_FALLBACK_MODEL").unwrap_or_else(|_| self.fallback.clone());
        Self {
            primary,
            fallback,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Memory,
    File,
    Pgvector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,
    pub path: Option<String>,
    pub url: Option<String>,
}

impl VectorStoreConfig {
    pub fn with_env_overrides(&self) -> Self {
        let url = env::var("VECTOR_STORE_URL").ok().or_else(|| self.url.clone());
        Self {
            url,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub backend: SessionBackend,
    pub redis_url: Option<String>,
    #[serde(default = "SessionConfig::default_history_limit")]
    pub history_limit: usize,
    pub ttl_seconds: Option<u64>,
}

impl SessionConfig {
    fn default_history_limit() -> usize {
        10
    }

    pub fn with_env_overrides(&self) -> Self {
        let redis_url = env::var("REDIS_URL")
            .ok()
            .or_else(|| self.redis_url.clone());
        Self {
            redis_url,
            ..self.clone()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            redis_url: None,
            history_limit: Self::default_history_limit(),
            ttl_seconds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "ChunkingConfig::default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "ChunkingConfig::default_overlap")]
    pub overlap: usize,
}

impl ChunkingConfig {
    fn default_chunk_size() -> usize {
        1000
    }

    fn default_overlap() -> usize {
        200
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
            overlap: Self::default_overlap(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "RetrievalConfig::default_top_k")]
    pub top_k: usize,
    #[serde(default = "RetrievalConfig::default_max_context_chars")]
    pub max_context_chars: usize,
}

impl RetrievalConfig {
    fn default_top_k() -> usize {
        4
    }

    fn default_max_context_chars() -> usize {
        12_000
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: Self::default_top_k(),
            max_context_chars: Self::default_max_context_chars(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub document_dir: String,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> anyhow::Result<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| Self::default_config_path());
        Self::load(Path::new(&config_path))
    }

    pub fn default_config_path() -> String {
        "./config.toml".to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                chunk_size: self.chunking.chunk_size,
                overlap: self.chunking.overlap,
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ZeroValue("retrieval.top_k"));
        }
        if self.session.history_limit == 0 {
            return Err(ConfigError::ZeroValue("session.history_limit"));
        }
        if self.embedding.batch_size == Some(0) {
            return Err(ConfigError::ZeroValue("embedding.batch_size"));
        }

        match self.vector_store.backend {
            VectorBackend::File if self.vector_store.path.is_none() => {
                return Err(ConfigError::MissingField {
                    backend: "file",
                    field: "vector_store.path",
                });
            }
            VectorBackend::Pgvector if self.vector_store.with_env_overrides().url.is_none() => {
                return Err(ConfigError::MissingField {
                    backend: "pgvector",
                    field: "vector_store.url",
                });
            }
            _ => {}
        }

        if self.session.backend == SessionBackend::Redis
            && self.session.with_env_overrides().redis_url.is_none()
        {
            return Err(ConfigError::MissingField {
                backend: "redis",
                field: "session.redis_url",
            });
        }

        match self.llm.provider.as_str() {
            "openai" | "bedrock" => Ok(()),
            other => Err(ConfigError::UnknownBackend {
                kind: "llm",
                name: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"

[llm]
provider = "openai"
primary = "gpt-4o-mini"
fallback = "gpt-3.5-turbo"

[data]
document_dir = "./data/pdfs"
"#;

    #[test]
    fn should_deserialize_minimal_config_with_defaults() {
        let config: Config = toml::from_str(MINIMAL_TOML).unwrap();

        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.batch_size(), 64);
        assert_eq!(config.llm.primary, "gpt-4o-mini");
        assert_eq!(config.llm.fallback, "gpt-3.5-turbo");
        assert_eq!(config.data.document_dir, "./data/pdfs");

        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.server.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.vector_store.backend, VectorBackend::Memory);
        assert_eq!(config.session.backend, SessionBackend::Memory);
        assert_eq!(config.session.history_limit, 10);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_fill_missing_keys_of_partial_chunking_section() {
        let toml_content = format!("{}\n[chunking]\nchunk_size = 500\n", MINIMAL_TOML);

        let config: Config = toml::from_str(&toml_content).unwrap();

        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 200);
        assert!(config.validate().is_ok());

        let toml_content = format!("{}\n[chunking]\noverlap = 50\n", MINIMAL_TOML);
        let config: Config = toml::from_str(&toml_content).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 50);
    }

    #[test]
    fn should_deserialize_full_config() {
        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:8080"
max_upload_bytes = 1048576

[embedding]
provider = "cohere"
model = "embed-english-v3.0"
batch_size = 16

[llm]
provider = "bedrock"
primary = "anthropic.claude-3-5-sonnet-20241022-v2:0"
fallback = "anthropic.claude-3-5-sonnet-20240620-v1:0"
aws_region = "eu-central-1"
temperature = 0.2
max_tokens = 2048

[vector_store]
backend = "pgvector"
url = "postgresql://localhost:5432/rag"

[session]
backend = "redis"
redis_url = "redis://localhost:6379"
history_limit = 6
ttl_seconds = 3600

[chunking]
chunk_size = 800
overlap = 100

[retrieval]
top_k = 6

[data]
document_dir = "./docs"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.server.max_upload_bytes, 1_048_576);
        assert_eq!(config.embedding.batch_size(), 16);
        assert_eq!(config.llm.aws_region.as_deref(), Some("eu-central-1"));
        assert_eq!(config.llm.max_tokens, Some(2048));
        assert_eq!(config.vector_store.backend, VectorBackend::Pgvector);
        assert_eq!(config.session.backend, SessionBackend::Redis);
        assert_eq!(config.session.history_limit, 6);
        assert_eq!(config.session.ttl_seconds, Some(3600));
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.retrieval.max_context_chars, 12_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL_TOML.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.llm.primary, "gpt-4o-mini");
    }

    #[test]
    fn should_load_config_from_config_path_env() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL_TOML.as_bytes()).unwrap();
        let temp_path = temp_file.path().to_string_lossy().to_string();

        env::set_var("CONFIG_PATH", &temp_path);
        let config = Config::load_from_env().unwrap();
        env::remove_var("CONFIG_PATH");

        assert_eq!(config.embedding.provider, "openai");
    }

    #[test]
    fn should_use_default_config_path() {
        assert_eq!(Config::default_config_path(), "./config.toml");
    }

    #[test]
    fn should_return_error_for_missing_file() {
        let result = Config::load(Path::new("/non/existent/path.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn should_return_error_for_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"invalid toml content [[[").unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn should_reject_overlap_not_smaller_than_chunk_size() {
        let mut config: Config = toml::from_str(MINIMAL_TOML).unwrap();
        config.chunking = ChunkingConfig {
            chunk_size: 100,
            overlap: 100,
        };

        assert_eq!(
            config.validate(),
            Err(ConfigError::OverlapTooLarge {
                chunk_size: 100,
                overlap: 100
            })
        );
    }

    #[test]
    fn should_reject_zero_values() {
        let mut config: Config = toml::from_str(MINIMAL_TOML).unwrap();
        config.chunking.chunk_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroChunkSize));

        let mut config: Config = toml::from_str(MINIMAL_TOML).unwrap();
        config.retrieval.top_k = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroValue("retrieval.top_k"))
        );

        let mut config: Config = toml::from_str(MINIMAL_TOML).unwrap();
        config.session.history_limit = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroValue("session.history_limit"))
        );
    }

    #[test]
    fn should_require_path_for_file_backend() {
        let mut config: Config = toml::from_str(MINIMAL_TOML).unwrap();
        config.vector_store.backend = VectorBackend::File;

        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingField {
                backend: "file",
                field: "vector_store.path"
            })
        );

        config.vector_store.path = Some("./index.json".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_reject_unknown_llm_provider() {
        let mut config: Config = toml::from_str(MINIMAL_TOML).unwrap();
        config.llm.provider = "palm".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "unknown llm backend 'palm'");
    }

    #[test]
    fn should_reject_unknown_vector_backend_name() {
        let toml_content = MINIMAL_TOML.to_string() + "\n[vector_store]\nbackend = \"faiss\"\n";
        assert!(toml::from_str::<Config>(&toml_content).is_err());
    }

    #[test]
    fn should_override_llm_models_from_env() {
        let config: Config = toml::from_str(MINIMAL_TOML).unwrap();

        env::set_var("LLM_FALLBACK_MODEL", "gpt-4o");
        let llm = config.llm.with_env_overrides();
        env::remove_var("LLM_FALLBACK_MODEL");

        assert_eq!(llm.fallback, "gpt-4o");
        assert_eq!(llm.provider, "openai");
    }
}
