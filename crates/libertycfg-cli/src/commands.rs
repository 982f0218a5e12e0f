//! Command implementations

use crate::OutputFormat;
use crate::output::{Finding, FindingKind, print_findings, print_vars};
use anyhow::{Context, bail};
use libertycfg_core::merge::{collect_variables, flatten};
use libertycfg_core::password::{PasswordState, validate_password};
use libertycfg_core::registry::DocumentRegistry;
use libertycfg_core::result::ResultExt;
use libertycfg_core::server::ServerLayout;
use libertycfg_core::variables::{VariableLookup, VariableStore, VariableType, resolve};
use libertycfg_core::xml::{XmlElement, XmlNode};
use std::fs;
use std::path::{Path, PathBuf};

/// Build the effective variable set of a server: predefined layout
/// variables, bootstrap.properties, server.env, then `<variable>`
/// declarations across the whole graph.
fn build_store(registry: &DocumentRegistry, config: &Path) -> anyhow::Result<VariableStore> {
    let mut store = VariableStore::new();
    if let Some(layout) = ServerLayout::from_config_root(config) {
        layout.populate_predefined(&mut store);
        libertycfg_core::bootstrap::populate_store(
            &mut store,
            &layout.bootstrap_properties(),
            &layout.server_env(),
        )
        .with_context(|| format!("reading bootstrap files for {}", config.display()))?;
    }
    collect_variables(registry, config, &mut store)
        .with_context(|| format!("collecting variables from {}", config.display()))?;
    Ok(store)
}

pub fn flatten_command(config: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let registry = DocumentRegistry::new();
    let store = build_store(&registry, config)?;
    let text = flatten(&registry, config, Some(&store))
        .with_context(|| format!("flattening {}", config.display()))?;
    match output {
        Some(path) => fs::write(&path, text)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{text}"),
    }
    Ok(())
}

pub fn vars_command(
    config: &Path,
    format: OutputFormat,
    var_type: Option<&str>,
) -> anyhow::Result<()> {
    let registry = DocumentRegistry::new();
    let store = build_store(&registry, config)?;
    let names: Option<Vec<String>> = match var_type {
        Some(raw) => {
            let requested = parse_var_type(raw)?;
            Some(store.vars_of_type(requested, true))
        }
        None => None,
    };
    print_vars(&store, names.as_deref(), format);
    Ok(())
}

pub fn resolve_command(config: &Path, value: &str) -> anyhow::Result<()> {
    let registry = DocumentRegistry::new();
    let store = build_store(&registry, config)?;
    let resolution = resolve(&store, value, None);
    println!("{}", resolution.text());
    for undefined in resolution.undefined_references() {
        eprintln!("undefined variable: {}", undefined.name);
    }
    if resolution.has_invalid_expression() {
        eprintln!("invalid expression, left unresolved");
    }
    if !resolution.is_fully_resolved() {
        std::process::exit(1);
    }
    Ok(())
}

pub fn files_command(config: &Path) -> anyhow::Result<()> {
    let registry = DocumentRegistry::new();
    let store = build_store(&registry, config)?;
    let files = registry
        .all_config_files(config, Some(&store))
        .with_context(|| format!("walking the graph of {}", config.display()))?;
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}

pub fn validate_command(
    config: &Path,
    format: OutputFormat,
    runtime_version: &str,
) -> anyhow::Result<()> {
    let registry = DocumentRegistry::new();
    let store = build_store(&registry, config)?;
    let files = registry
        .all_config_files(config, Some(&store))
        .with_context(|| format!("walking the graph of {}", config.display()))?;

    let mut findings = Vec::new();
    for file in &files {
        // One broken file should not hide the findings of the rest
        let Some(doc) = registry.load(file, None).log_and_continue() else {
            findings.push(Finding {
                file: file.clone(),
                kind: FindingKind::UnreadableFile,
                detail: "could not be loaded".to_string(),
            });
            continue;
        };
        let mut writer = doc.write();
        for location in writer.unresolved_includes(Some(&store)) {
            findings.push(Finding {
                file: file.clone(),
                kind: FindingKind::UnresolvedInclude,
                detail: location,
            });
        }
        check_passwords(writer.root(), file, runtime_version, &store, &mut findings);
    }

    let ok = findings.is_empty();
    print_findings(&findings, files.len(), format);
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Walk every element looking for password-carrying attributes
fn check_passwords(
    element: &XmlElement,
    file: &Path,
    runtime_version: &str,
    vars: &dyn VariableLookup,
    findings: &mut Vec<Finding>,
) {
    for (name, value) in &element.attributes {
        if !name.to_ascii_lowercase().contains("password") {
            continue;
        }
        // A reference may expand to an encoded value at runtime
        let expanded = resolve(vars, value, None);
        let state = validate_password(expanded.text(), runtime_version);
        let kind = match state {
            PasswordState::Ok => continue,
            PasswordState::PlainText => FindingKind::PlainTextPassword,
            PasswordState::NotSupportAes => FindingKind::UnsupportedAes,
            PasswordState::UnknownAlgorithm => FindingKind::UnknownPasswordAlgorithm,
        };
        findings.push(Finding {
            file: file.to_path_buf(),
            kind,
            detail: format!("<{}> attribute '{}'", element.name, name),
        });
    }
    for child in &element.children {
        if let XmlNode::Element(inner) = child {
            check_passwords(inner, file, runtime_version, vars, findings);
        }
    }
}

fn parse_var_type(raw: &str) -> anyhow::Result<VariableType> {
    let parsed = match raw.to_ascii_lowercase().as_str() {
        "boolean" => VariableType::Boolean,
        "short" => VariableType::Short,
        "int" => VariableType::Int,
        "long" => VariableType::Long,
        "duration" => VariableType::Duration,
        "string" => VariableType::String,
        "token" => VariableType::Token,
        "location" => VariableType::Location,
        other => bail!("unknown variable type '{other}'"),
    };
    Ok(parsed)
}
