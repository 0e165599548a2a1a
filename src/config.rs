use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rootcause::agents::JiraSettings;
use rootcause::agents::code::{DEFAULT_EXTENSIONS, DEFAULT_MAX_FILE_BYTES, SourceCollector};
use rootcause::datasource::DEFAULT_MAX_ROWS;
use rootcause::diagnose::{DEFAULT_BUDGET, DEFAULT_TOP_K, StatementPolicy};
use rootcause::llm::{AnthropicConfig, RetryPolicy};
use rootcause::orchestrator::AnalysisOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub diagnosis: DiagnosisConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
    pub code: CodeConfig,
    pub jira: JiraSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let defaults = AnthropicConfig::default();
        Self {
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            timeout_ms: defaults.timeout.as_millis() as u64,
            api_key_env: defaults.api_key_env,
            base_url: None,
            max_retries: RetryPolicy::default().max_retries,
        }
    }
}

impl LlmConfig {
    pub fn anthropic(&self) -> AnthropicConfig {
        let mut config = AnthropicConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout: Duration::from_millis(self.timeout_ms),
            api_key_env: self.api_key_env.clone(),
            ..Default::default()
        };
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    pub budget: u32,
    pub top_k: usize,
    pub max_rows: usize,
    pub dialect: String,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            top_k: DEFAULT_TOP_K,
            max_rows: DEFAULT_MAX_ROWS,
            dialect: "SQLite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection: Option<String>,
    pub read_only: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection: None,
            read_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Relative paths are resolved against `dir`
    pub audit_log: Option<PathBuf>,
    pub export_csv: bool,
    /// Retrieval index persisted between runs; relative to `dir`
    pub index_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            audit_log: Some(PathBuf::from("db_agent.log")),
            export_csv: true,
            index_path: Some(PathBuf::from("retrieval_index.json")),
        }
    }
}

impl OutputConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.dir.join(path) }
    }

    pub fn audit_log_path(&self) -> Option<PathBuf> {
        self.audit_log.as_deref().map(|p| self.resolve(p))
    }

    pub fn index_file(&self) -> Option<PathBuf> {
        self.index_path.as_deref().map(|p| self.resolve(p))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeConfig {
    pub project_path: Option<PathBuf>,
    pub extensions: Vec<String>,
    pub max_file_kb: u64,
    pub max_total_kb: Option<u64>,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            project_path: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_file_kb: DEFAULT_MAX_FILE_BYTES / 1024,
            max_total_kb: None,
        }
    }
}

impl CodeConfig {
    pub fn collector(&self) -> SourceCollector {
        SourceCollector::new(
            self.extensions.clone(),
            self.max_file_kb * 1024,
            self.max_total_kb.map(|kb| kb * 1024),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            diagnosis: DiagnosisConfig::default(),
            database: DatabaseConfig::default(),
            output: OutputConfig::default(),
            code: CodeConfig::default(),
            jira: JiraSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. ./rootcause.yml
    /// 3. ~/.config/rootcause/rootcause.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        let local_config = PathBuf::from(format!("{}.yml", project_name));
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.diagnosis.max_rows == 0 {
            return Err(eyre!("diagnosis.max_rows must be greater than zero"));
        }
        if self.diagnosis.top_k == 0 {
            return Err(eyre!("diagnosis.top_k must be greater than zero"));
        }
        Ok(())
    }

    pub fn policy(&self) -> StatementPolicy {
        StatementPolicy::from_read_only(self.database.read_only)
    }

    /// Analysis options from config alone; the CLI layers its flags on top
    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            connection_string: self.database.connection.clone(),
            budget: self.diagnosis.budget,
            top_k: self.diagnosis.top_k,
            policy: self.policy(),
            dialect: self.diagnosis.dialect.clone(),
            project_path: self.code.project_path.clone(),
            collector: self.code.collector(),
            output_dir: self.output.dir.clone(),
            audit_log: self.output.audit_log_path(),
            export_csv: self.output.export_csv,
            create_ticket: false,
            jira: Some(self.jira.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.diagnosis.budget, 10);
        assert_eq!(config.diagnosis.top_k, 3);
        assert_eq!(config.diagnosis.max_rows, 500);
        assert!(config.database.read_only);
        assert_eq!(config.jira.project_key, "STS");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "diagnosis:\n  budget: 4\ndatabase:\n  connection: sqlite://ops.db\n  read_only: false\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.diagnosis.budget, 4);
        assert_eq!(config.diagnosis.top_k, 3);
        assert_eq!(config.database.connection.as_deref(), Some("sqlite://ops.db"));
        assert_eq!(config.policy(), StatementPolicy::Unrestricted);
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.diagnosis.max_rows = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.diagnosis.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rootcause.yml");
        fs::write(&path, "log_level: debug\nllm:\n  model: claude-test\n  timeout_ms: 1000\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        let anthropic = config.llm.anthropic();
        assert_eq!(anthropic.model, "claude-test");
        assert_eq!(anthropic.timeout, Duration::from_millis(1000));
        assert_eq!(config.llm.retry_policy().max_retries, 2);
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        fs::write(&path, "diagnosis:\n  top_k: 0\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_output_paths_resolve_against_dir() {
        let output = OutputConfig {
            dir: PathBuf::from("reports"),
            ..Default::default()
        };
        assert_eq!(output.audit_log_path(), Some(PathBuf::from("reports/db_agent.log")));
        assert_eq!(output.index_file(), Some(PathBuf::from("reports/retrieval_index.json")));
    }

    #[test]
    fn test_analysis_options() {
        let config = Config::default();
        let options = config.analysis_options();
        assert_eq!(options.budget, 10);
        assert!(options.connection_string.is_none());
        assert!(options.policy.is_read_only());
        assert!(!options.create_ticket);
    }
}
