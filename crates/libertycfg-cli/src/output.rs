//! Output formatting for the CLI commands

use crate::OutputFormat;
use colored::Colorize;
use libertycfg_core::variables::VariableStore;
use serde::Serialize;
use std::path::PathBuf;

/// One validation finding
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub file: PathBuf,
    pub kind: FindingKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    UnresolvedInclude,
    UnreadableFile,
    PlainTextPassword,
    UnsupportedAes,
    UnknownPasswordAlgorithm,
}

impl FindingKind {
    fn describe(self) -> &'static str {
        match self {
            FindingKind::UnresolvedInclude => "unresolved include",
            FindingKind::UnreadableFile => "unreadable file",
            FindingKind::PlainTextPassword => "plain text password",
            FindingKind::UnsupportedAes => "aes password unsupported on this runtime",
            FindingKind::UnknownPasswordAlgorithm => "unknown password algorithm",
        }
    }
}

pub fn print_findings(findings: &[Finding], files_checked: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Report<'a> {
                files_checked: usize,
                findings: &'a [Finding],
            }
            let report = Report {
                files_checked,
                findings,
            };
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("error: {e}"),
            }
        }
        OutputFormat::Human => {
            for finding in findings {
                println!(
                    "{} {}: {} ({})",
                    "warning:".yellow().bold(),
                    finding.kind.describe(),
                    finding.detail,
                    finding.file.display()
                );
            }
            if findings.is_empty() {
                println!(
                    "{} {} file(s) checked, no findings",
                    "ok:".green().bold(),
                    files_checked
                );
            } else {
                println!(
                    "{} finding(s) across {} file(s)",
                    findings.len(),
                    files_checked
                );
            }
        }
    }
}

pub fn print_vars(store: &VariableStore, filter: Option<&[String]>, format: OutputFormat) {
    let keep = |name: &str| filter.is_none_or(|names| names.iter().any(|n| n == name));
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Var<'a> {
                name: &'a str,
                value: &'a str,
                var_type: &'static str,
            }
            let vars: Vec<Var> = store
                .iter()
                .filter(|(name, _, _)| keep(name))
                .map(|(name, value, var_type)| Var {
                    name,
                    value,
                    var_type: var_type.as_str(),
                })
                .collect();
            match serde_json::to_string_pretty(&vars) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("error: {e}"),
            }
        }
        OutputFormat::Human => {
            for (name, value, var_type) in store.iter() {
                if !keep(name) {
                    continue;
                }
                println!(
                    "{} = {} {}",
                    name.cyan(),
                    value,
                    format!("({})", var_type.as_str()).dimmed()
                );
            }
        }
    }
}
