//! Lint stage: resolve the lint globs, run a [`Linter`], surface every finding.
//!
//! Two linters ship with the crate. [`BuiltinLinter`] applies a handful of
//! line-based rules and needs nothing installed. [`CommandLinter`] shells out
//! to an external tool that prints `path:line:col: message [rule]` lines
//! (`eslint --format unix` does).

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::contract::{Diagnostic, Linter};
use crate::error::LintError;

#[derive(Debug, Clone, Default)]
pub struct LintReport {
    pub linter: String,
    pub files_checked: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Expand `patterns` relative to `root` into a sorted, de-duplicated list of
/// root-relative file paths.
pub fn resolve_files(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, LintError> {
    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let mut files = Vec::new();
    for pattern in patterns {
        let full = Path::new(&escaped_root).join(pattern);
        let full = full.to_string_lossy();
        let matches = glob::glob(&full).map_err(|source| LintError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        let before = files.len();
        for entry in matches {
            match entry {
                Ok(path) if path.is_file() => {
                    let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                    files.push(relative);
                }
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().to_path_buf();
                    return Err(LintError::Io {
                        path,
                        source: e.into(),
                    });
                }
            }
        }
        if files.len() == before {
            warn!(pattern = %pattern, "[LINT] Pattern matched no files");
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Run `linter` over the files matched by `patterns`.
///
/// Each diagnostic is printed to stderr as it would be by the tool itself; the
/// caller decides whether a non-clean report fails the pipeline.
pub fn run_lint(
    linter: &dyn Linter,
    root: &Path,
    patterns: &[String],
) -> Result<LintReport, LintError> {
    let files = resolve_files(root, patterns)?;
    info!(linter = %linter.name(), files = files.len(), "[LINT] Linting files");

    let diagnostics = linter.lint(root, &files)?;
    for diagnostic in &diagnostics {
        eprintln!("{diagnostic}");
        error!(
            path = %diagnostic.path.display(),
            line = diagnostic.line,
            column = diagnostic.column,
            rule = %diagnostic.rule,
            "[LINT] {}", diagnostic.message
        );
    }
    if diagnostics.is_empty() {
        info!(files = files.len(), "[LINT] No violations");
    }

    Ok(LintReport {
        linter: linter.name(),
        files_checked: files.len(),
        diagnostics,
    })
}

/// Line-based rules that need no external tooling.
pub struct BuiltinLinter {
    max_line_length: usize,
    debugger: Regex,
}

impl BuiltinLinter {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            debugger: Regex::new(r"^\s*debugger\s*;?\s*(//.*)?$").expect("static regex is valid"),
        }
    }

    /// Check one file's contents; `path` is only used to label findings.
    pub fn check_source(&self, path: &Path, source: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let finding = |line: usize, column: usize, rule: &str, message: String| Diagnostic {
            path: path.to_path_buf(),
            line,
            column,
            rule: rule.to_string(),
            message,
        };

        for (index, line) in source.lines().enumerate() {
            let number = index + 1;
            let trimmed = line.trim_end();
            if trimmed.len() != line.len() {
                diagnostics.push(finding(
                    number,
                    trimmed.chars().count() + 1,
                    "no-trailing-spaces",
                    "Trailing spaces not allowed.".to_string(),
                ));
            }
            let indent: String = line
                .chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .collect();
            if indent.contains(' ') && indent.contains('\t') {
                diagnostics.push(finding(
                    number,
                    1,
                    "no-mixed-spaces-and-tabs",
                    "Mixed spaces and tabs.".to_string(),
                ));
            }
            if self.debugger.is_match(line) {
                diagnostics.push(finding(
                    number,
                    line.len() - line.trim_start().len() + 1,
                    "no-debugger",
                    "Unexpected 'debugger' statement.".to_string(),
                ));
            }
            let length = line.chars().count();
            if length > self.max_line_length {
                diagnostics.push(finding(
                    number,
                    1,
                    "max-len",
                    format!(
                        "Line {number} exceeds the maximum line length of {}.",
                        self.max_line_length
                    ),
                ));
            }
        }

        if !source.is_empty() && !source.ends_with('\n') {
            let last_line = source.lines().count().max(1);
            let last_len = source.lines().last().map(|l| l.chars().count()).unwrap_or(0);
            diagnostics.push(finding(
                last_line,
                last_len + 1,
                "eol-last",
                "Newline required at end of file but not found.".to_string(),
            ));
        }

        diagnostics
    }
}

impl Default for BuiltinLinter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Linter for BuiltinLinter {
    fn name(&self) -> String {
        "builtin".to_string()
    }

    fn lint(&self, root: &Path, files: &[PathBuf]) -> Result<Vec<Diagnostic>, LintError> {
        let mut diagnostics = Vec::new();
        for file in files {
            let path = root.join(file);
            let source = std::fs::read_to_string(&path).map_err(|source| LintError::Io {
                path: path.clone(),
                source,
            })?;
            let found = self.check_source(file, &source);
            debug!(path = %file.display(), findings = found.len(), "[LINT] Checked file");
            diagnostics.extend(found);
        }
        Ok(diagnostics)
    }
}

/// Delegates to an external linter, e.g. `eslint --format unix`.
pub struct CommandLinter {
    program: String,
    args: Vec<String>,
    line: Regex,
}

impl CommandLinter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            line: Regex::new(r"^(?P<path>.+?):(?P<line>\d+):(?P<col>\d+): (?P<msg>.*?)(?: \[(?P<rule>[^\]]+)\])?$")
                .expect("static regex is valid"),
        }
    }

    /// Build from a `[program, args...]` list; `None` when the list is empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    /// Parse tool output into diagnostics, ignoring lines that do not match.
    pub fn parse_output(&self, output: &str) -> Vec<Diagnostic> {
        output
            .lines()
            .filter_map(|line| {
                let caps = self.line.captures(line.trim_end())?;
                Some(Diagnostic {
                    path: PathBuf::from(&caps["path"]),
                    line: caps["line"].parse().ok()?,
                    column: caps["col"].parse().ok()?,
                    rule: caps
                        .name("rule")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_else(|| "lint".to_string()),
                    message: caps["msg"].to_string(),
                })
            })
            .collect()
    }
}

impl Linter for CommandLinter {
    fn name(&self) -> String {
        self.program.clone()
    }

    fn lint(&self, root: &Path, files: &[PathBuf]) -> Result<Vec<Diagnostic>, LintError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(files)
            .current_dir(root)
            .output()
            .map_err(|source| {
                error!(error = ?source, program = %self.program, "[LINT] Failed to launch linter");
                LintError::Spawn {
                    program: self.program.clone(),
                    source,
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostics = self.parse_output(&stdout);
        if !output.status.success() && diagnostics.is_empty() {
            return Err(LintError::ToolFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(diagnostics)
    }
}
