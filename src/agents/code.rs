//! Code agent - gathers project sources and asks the model where the failure lives.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TriageError};
use crate::llm::LlmClient;

/// Source extensions collected by default
pub const DEFAULT_EXTENSIONS: &[&str] = &[".py", ".cs", ".js", ".ts", ".rs"];

/// Files larger than this are skipped
pub const DEFAULT_MAX_FILE_BYTES: u64 = 200 * 1024;

/// Walks a project tree and concatenates matching source files.
#[derive(Debug, Clone)]
pub struct SourceCollector {
    extensions: Vec<String>,
    max_file_bytes: u64,
    /// Stop adding files once the collected text would exceed this
    max_total_bytes: Option<u64>,
}

impl Default for SourceCollector {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_total_bytes: None,
        }
    }
}

impl SourceCollector {
    pub fn new(extensions: Vec<String>, max_file_bytes: u64, max_total_bytes: Option<u64>) -> Self {
        Self {
            extensions,
            max_file_bytes,
            max_total_bytes,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Matching files under `root`, sorted
    pub fn files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(TriageError::Config(format!(
                "project path is not a directory: {}",
                root.display()
            )));
        }

        let pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| TriageError::Config(format!("invalid project path pattern: {}", e)))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file() && self.matches(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Concatenated sources, each prefixed with a `# File:` header.
    ///
    /// Oversized, unreadable and non-UTF-8 files are skipped.
    pub fn collect(&self, root: &Path) -> Result<String> {
        let mut collected = String::new();
        let mut included = 0usize;

        for path in self.files(root)? {
            let size = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    log::debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            if size > self.max_file_bytes {
                log::debug!("Skipping {} ({} bytes over cap)", path.display(), size);
                continue;
            }

            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    log::debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            let block = format!("\n# File: {}\n{}\n", path.display(), content);
            let over_cap = self
                .max_total_bytes
                .is_some_and(|limit| (collected.len() + block.len()) as u64 > limit);
            if over_cap {
                log::warn!("Source size cap reached after {} file(s)", included);
                break;
            }
            collected.push_str(&block);
            included += 1;
        }

        log::info!("Collected {} source file(s) from {}", included, root.display());
        Ok(collected)
    }
}

pub fn code_prompt(log_summary: &str, source_code: &str) -> String {
    format!(
        "The following error was found in logs:\n'{}'\n\
         Here is the relevant source code:\n{}\n\
         Analyze the source code and identify the most probable root cause. \
         Provide the specific code block (function, method, or class) where the issue likely occurred, \
         and explain your reasoning.",
        log_summary.trim(),
        source_code
    )
}

/// One model call over the collected sources
pub async fn analyze_code<L: LlmClient + ?Sized>(llm: &L, log_summary: &str, source_code: &str) -> Result<String> {
    if source_code.trim().is_empty() {
        return Err(TriageError::Config("no source files found to analyze".to_string()));
    }
    let analysis = llm.chat(&code_prompt(log_summary, source_code)).await?;
    Ok(analysis.trim().to_string())
}
