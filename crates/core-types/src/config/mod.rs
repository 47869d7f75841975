//! Configuration for the indexing and search system.
//!
//! Loaded from TOML with `{data_dir}` placeholder substitution and
//! environment-variable expansion (`$VAR` everywhere, `%VAR%` on Windows),
//! mirroring the workspace's existing config-loading idiom: a
//! `Lazy<RwLock<Config>>` global that can be reloaded without restarting the
//! process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::{fs, io};

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Top-level configuration, covering every option in the external
/// interfaces section: index locations, eligibility policy, worker sizing,
/// and embedding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_index_dir")]
    pub index_dir: String,
    #[serde(default = "default_vector_db_path")]
    pub vector_db_path: String,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_monitored_paths")]
    pub monitored_paths: Vec<String>,
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: HashSet<String>,
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: HashSet<String>,
    #[serde(default = "default_text_extensions")]
    pub supported_text_extensions: HashSet<String>,
    #[serde(default = "default_document_extensions")]
    pub supported_document_extensions: HashSet<String>,
    #[serde(default)]
    pub use_process_pool: bool,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            vector_db_path: default_vector_db_path(),
            max_file_size: default_max_file_size(),
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            monitored_paths: default_monitored_paths(),
            excluded_extensions: default_excluded_extensions(),
            excluded_dirs: default_excluded_dirs(),
            supported_text_extensions: default_text_extensions(),
            supported_document_extensions: default_document_extensions(),
            use_process_pool: false,
            embedding: EmbeddingSection::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// All extensions eligible for extraction (text ∪ document).
    pub fn all_supported_extensions(&self) -> HashSet<String> {
        self.supported_text_extensions
            .union(&self.supported_document_extensions)
            .cloned()
            .collect()
    }

    /// Reject configurations that cannot produce a working scheduler/index.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(anyhow::anyhow!("max_workers must be >= 1"));
        }
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be >= 1"));
        }
        if self.embedding.chunk_overlap >= self.embedding.chunk_size {
            return Err(anyhow::anyhow!(
                "embedding.chunk_overlap must be smaller than embedding.chunk_size"
            ));
        }
        Ok(())
    }
}

/// Embedding / vector-index tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSection {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_models")]
    pub cache_models: bool,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            similarity_top_k: default_similarity_top_k(),
            similarity_threshold: default_similarity_threshold(),
            batch_size: default_batch_size(),
            cache_models: default_cache_models(),
        }
    }
}

fn default_index_dir() -> String {
    "{data_dir}/index".into()
}
fn default_vector_db_path() -> String {
    "{data_dir}/vectors".into()
}
fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}
fn default_max_workers() -> usize {
    4
}
fn default_batch_size() -> usize {
    100
}
fn default_monitored_paths() -> Vec<String> {
    vec!["$HOME".into()]
}
fn default_excluded_extensions() -> HashSet<String> {
    [
        ".tmp", ".log", ".cache", ".DS_Store", ".pyc", ".pyo", ".so", ".dylib", ".app",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_excluded_dirs() -> HashSet<String> {
    [
        ".git",
        "__pycache__",
        "node_modules",
        ".venv",
        ".virtualenv",
        ".tox",
        ".pytest_cache",
        ".mypy_cache",
        "Library",
        "System",
        ".Trash",
        ".npm",
        ".cache",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_text_extensions() -> HashSet<String> {
    [
        ".txt", ".md", ".py", ".js", ".html", ".css", ".json", ".xml", ".yaml", ".yml", ".toml",
        ".ini", ".cfg", ".conf",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_document_extensions() -> HashSet<String> {
    [".pdf", ".docx", ".doc", ".xlsx", ".xls", ".pptx", ".ppt"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_model_name() -> String {
    "all-minilm-l12-v2".into()
}
fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_similarity_top_k() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.0
}
fn default_cache_models() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> String {
    "$HOME/.local_search".into()
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// A clone of the currently loaded configuration.
pub fn get_current_config() -> Config {
    CONFIG.read().expect("config lock poisoned").clone()
}

/// Load configuration from `.env` plus a TOML file, applying placeholder and
/// environment-variable expansion, validating, and storing it as the
/// process-wide current configuration.
pub fn load_config(path: &Path) -> Result<Config> {
    let _ = dotenvy::dotenv();
    reload_config(path)
}

/// Force a reload from `path`, creating a default file there first if it is
/// missing.
pub fn load_or_create_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut cfg = Config::default();
        expand_placeholders(&mut cfg, &default_data_dir());
        let toml = toml::to_string_pretty(&cfg)?;
        fs::write(path, toml)?;
    }
    load_config(path)
}

/// Default config file location: `<data_dir>/config.toml`, with `$HOME` and
/// `~` expanded the same way the rest of the config layer expands paths.
pub fn default_config_path() -> PathBuf {
    let data_dir = expand_env_vars(&default_data_dir());
    expand_tilde(&data_dir).join("config.toml")
}

fn reload_config(path: &Path) -> Result<Config> {
    let mut lock = CONFIG
        .write()
        .map_err(|_| anyhow::anyhow!("config lock poisoned"))?;

    match fs::read_to_string(path) {
        Ok(raw) => {
            let mut cfg: Config = toml::from_str(&raw)?;
            let data_dir = default_data_dir();
            expand_placeholders(&mut cfg, &data_dir);
            cfg.validate()?;
            *lock = cfg.clone();
            Ok(cfg)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(lock.clone()),
        Err(e) => Err(e.into()),
    }
}

fn expand_placeholders(cfg: &mut Config, data_dir: &str) {
    let data_dir = expand_env_vars(data_dir);
    cfg.index_dir = expand_env_vars(&cfg.index_dir.replace("{data_dir}", &data_dir));
    cfg.vector_db_path = expand_env_vars(&cfg.vector_db_path.replace("{data_dir}", &data_dir));
    cfg.monitored_paths = cfg
        .monitored_paths
        .iter()
        .map(|p| expand_env_vars(p))
        .collect();
}

/// Expand `$VAR` references on every platform, and `%VAR%` on Windows.
fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    if result.contains('$') {
        for (key, value) in std::env::vars() {
            let token = format!("${key}");
            if result.contains(&token) {
                result = result.replace(&token, &value);
            }
        }
    }
    #[cfg(windows)]
    {
        if result.contains('%') {
            use std::collections::HashMap;
            let env_map: HashMap<String, String> = std::env::vars()
                .map(|(k, v)| (k.to_ascii_uppercase(), v))
                .collect();
            let mut out = String::with_capacity(result.len());
            let mut chars = result.chars().peekable();
            while let Some(ch) = chars.next() {
                if ch == '%' {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '%' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if closed && !name.is_empty() {
                        if let Some(val) = env_map.get(&name.to_ascii_uppercase()) {
                            out.push_str(val);
                            continue;
                        }
                    }
                    out.push('%');
                    out.push_str(&name);
                    if closed {
                        out.push('%');
                    }
                } else {
                    out.push(ch);
                }
            }
            result = out;
        }
    }
    result
}

/// Expand a leading `~` the way a shell would.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.max_file_size, 100 * 1024 * 1024);
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.batch_size, 100);
        assert!(cfg.excluded_dirs.contains(".git"));
        assert!(cfg.excluded_extensions.contains(".tmp"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut cfg = Config::default();
        cfg.max_workers = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_overlap_ge_chunk_size() {
        let mut cfg = Config::default();
        cfg.embedding.chunk_overlap = cfg.embedding.chunk_size;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn all_supported_extensions_is_union() {
        let cfg = Config::default();
        let all = cfg.all_supported_extensions();
        assert!(all.contains(".txt"));
        assert!(all.contains(".pdf"));
    }

    #[test]
    fn placeholder_expansion_substitutes_data_dir() {
        let mut cfg = Config::default();
        expand_placeholders(&mut cfg, "/srv/search");
        assert_eq!(cfg.index_dir, "/srv/search/index");
        assert_eq!(cfg.vector_db_path, "/srv/search/vectors");
    }

    #[test]
    fn expand_env_vars_substitutes_dollar_vars() {
        // SAFETY: test-local, single-threaded env mutation.
        unsafe {
            std::env::set_var("LOCALSEARCH_TEST_VAR", "value123");
        }
        let out = expand_env_vars("$LOCALSEARCH_TEST_VAR/sub");
        assert_eq!(out, "value123/sub");
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = Config::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.max_workers, cfg.max_workers);
        assert_eq!(back.excluded_dirs, cfg.excluded_dirs);
    }
}
