use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub history_db_path: PathBuf,
    pub knowledge_base_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let data_dir = discover_data_dir(&project_root);
        Self::from_dirs(project_root, data_dir)
    }

    /// Paths rooted at a caller-supplied directory, for tests and tooling.
    pub fn rooted_at(root: &Path) -> Self {
        Self::from_dirs(root.to_path_buf(), root.to_path_buf())
    }

    fn from_dirs(project_root: PathBuf, data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        let history_db_path = data_dir.join("aria_history.db");
        let knowledge_base_dir = data_dir.join("knowledge_base");

        for dir in [&data_dir, &log_dir, &knowledge_base_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            data_dir,
            log_dir,
            history_db_path,
            knowledge_base_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("ARIA_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.project_root.join("config.yml")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("ARIA_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("ARIA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return project_root.join("data");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Aria");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Aria");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("aria")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible inference server.
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub tip_max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            chat_model: "qwen-chat".to_string(),
            embedding_model: "text-embedding".to_string(),
            temperature: 0.7,
            top_p: 0.8,
            max_tokens: 2048,
            tip_max_tokens: 64,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    pub coarse_chunk_size: usize,
    pub coarse_overlap: usize,
    pub fine_chunk_size: usize,
    pub fine_overlap: usize,
    pub default_k: usize,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            coarse_chunk_size: 500,
            coarse_overlap: 100,
            fine_chunk_size: 200,
            fine_overlap: 50,
            default_k: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedQaConfig {
    /// Relative to the project root unless absolute.
    pub path: String,
    pub threshold: f64,
}

impl Default for FixedQaConfig {
    fn default() -> Self {
        Self {
            path: "fixed_answers.json".to_string(),
            threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// "mock" serves fixture data; "weather_cn" scrapes the public page.
    pub source: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            source: "mock".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Messages of context handed to generation, excluding the in-flight turn.
    pub window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { window: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8200 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub knowledge_base: KnowledgeBaseConfig,
    pub fixed_qa: FixedQaConfig,
    pub weather: WeatherConfig,
    pub history: HistoryConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: AppConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ApiError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.llm.base_url.trim().is_empty() {
            return Err(ApiError::Config(
                "llm.base_url is not set; point it at an OpenAI-compatible server".to_string(),
            ));
        }
        if self.knowledge_base.fine_chunk_size == 0 || self.knowledge_base.coarse_chunk_size == 0 {
            return Err(ApiError::Config(
                "knowledge_base chunk sizes must be positive".to_string(),
            ));
        }
        if self.knowledge_base.fine_overlap >= self.knowledge_base.fine_chunk_size
            || self.knowledge_base.coarse_overlap >= self.knowledge_base.coarse_chunk_size
        {
            return Err(ApiError::Config(
                "knowledge_base overlap must be smaller than the chunk size".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fixed_qa_path(&self, paths: &AppPaths) -> PathBuf {
        let configured = PathBuf::from(&self.fixed_qa.path);
        if configured.is_absolute() {
            configured
        } else {
            paths.project_root.join(configured)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            llm: LlmConfig {
                base_url: "http://127.0.0.1:8088".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn missing_base_url_is_a_config_error() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let mut config = valid_config();
        config.knowledge_base.fine_overlap = config.knowledge_base.fine_chunk_size;
        assert!(matches!(config.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            "llm:\n  base_url: http://127.0.0.1:8088\n  temperature: 0.5\nhistory:\n  window: 6\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.llm.base_url, "http://127.0.0.1:8088");
        assert_eq!(config.llm.temperature, 0.5);
        assert_eq!(config.history.window, 6);
        // Untouched sections keep their defaults
        assert_eq!(config.knowledge_base.fine_chunk_size, 200);
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(&dir.path().join("nope.yml"));
        assert!(matches!(result, Err(ApiError::Config(_))));
    }
}
