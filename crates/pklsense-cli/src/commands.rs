//! Subcommand implementations
//!
//! Each command writes its report to the given writer so the binary and the
//! tests share one code path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use pklsense_core::{NodeId, SyntaxTree, TypeEnv, TypeRef};
use pklsense_registry::ModuleDependencyGraph;
use pklsense_resolve::Resolution;
use serde_json::json;
use tracing::{debug, info};

use crate::config::Config;
use crate::format::{CliFormatter, Formatter, GrammarVersion};
use crate::workspace::Workspace;

fn modules(workspace: &Workspace, paths: &[PathBuf]) -> Result<Vec<Arc<SyntaxTree>>> {
    if paths.is_empty() {
        return Ok(workspace.modules());
    }
    paths
        .iter()
        .map(|path| {
            workspace
                .module(path)
                .with_context(|| format!("Failed to load module {}", path.display()))
        })
        .collect()
}

/// Report diagnostics; returns how many were found
pub fn check(workspace: &Workspace, paths: &[PathBuf], as_json: bool, out: &mut dyn Write) -> Result<usize> {
    let resolver = workspace.resolver();
    let options = &workspace.config().diagnostics;
    let mut total = 0;
    let mut reports = Vec::new();
    for tree in modules(workspace, paths)? {
        let diagnostics = resolver.check_module(&tree, options);
        total += diagnostics.len();
        if as_json {
            reports.push(json!({
                "module": tree.id().to_string(),
                "diagnostics": diagnostics,
            }));
            continue;
        }
        for d in &diagnostics {
            writeln!(
                out,
                "{}:{}-{}: {}[{}] {}",
                tree.id(),
                d.span.start,
                d.span.end,
                d.severity.as_str(),
                d.code.as_str(),
                d.message
            )?;
        }
    }
    if as_json {
        writeln!(out, "{}", serde_json::to_string_pretty(&reports)?)?;
    }
    info!("{} diagnostics", total);
    Ok(total)
}

/// Show what the reference at `offset` resolves to and its type
pub fn resolve(workspace: &Workspace, path: &Path, offset: usize, as_json: bool, out: &mut dyn Write) -> Result<()> {
    let resolver = workspace.resolver();
    let tree = workspace.module(path)?;
    let node = tree
        .node_at_offset(offset)
        .ok_or_else(|| anyhow!("Offset {} is outside {}", offset, tree.id()))?;
    debug!("offset {} is node {:?}", offset, node);
    let ty = resolver.type_of(&tree, node);

    let target = match resolver.resolve(&tree, node) {
        Resolution::Resolved(decl) => {
            let span = resolver.tree(&decl.module).map(|t| t.span(decl.node));
            Some((decl, span))
        }
        Resolution::Unresolved => None,
    };

    if as_json {
        let declaration = target.as_ref().map(|(decl, span)| {
            json!({
                "module": decl.module.to_string(),
                "kind": format!("{:?}", decl.kind),
                "name": &*decl.name,
                "span": span,
            })
        });
        let report = json!({ "type": ty.to_string(), "declaration": declaration });
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }
    match target {
        Some((decl, span)) => {
            let span = span.map_or_else(String::new, |s| format!(":{}-{}", s.start, s.end));
            writeln!(out, "{:?} {} at {}{}", decl.kind, decl.name, decl.module, span)?;
        }
        None => writeln!(out, "unresolved")?,
    }
    writeln!(out, "type: {}", ty)?;
    Ok(())
}

pub fn optimize_imports(workspace: &Workspace, path: &Path, as_json: bool, out: &mut dyn Write) -> Result<()> {
    let tree = workspace.module(path)?;
    let edit = workspace.resolver().optimize_imports(&tree);
    if as_json {
        writeln!(out, "{}", serde_json::to_string_pretty(&edit)?)?;
        return Ok(());
    }
    match edit {
        Some(edit) if edit.changed => writeln!(out, "{}", edit.text)?,
        Some(_) => writeln!(out, "imports are already optimized")?,
        None => writeln!(out, "no imports")?,
    }
    Ok(())
}

pub fn format(config: &Config, path: &Path, grammar: Option<GrammarVersion>, out: &mut dyn Write) -> Result<()> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let formatter = CliFormatter::locate(config.formatter.executable.as_deref())?;
    let grammar = grammar.unwrap_or(config.formatter.grammar_version);
    let formatted = formatter
        .format(&source, grammar)
        .with_context(|| format!("Failed to format {}", path.display()))?;
    out.write_all(formatted.as_bytes())?;
    Ok(())
}

/// Print module dependencies, broken references and cycles
pub fn graph(workspace: &Workspace, as_json: bool, out: &mut dyn Write) -> Result<()> {
    let roots = workspace.store().ids();
    let graph = ModuleDependencyGraph::build(workspace.store().as_ref(), &roots);
    let cycles = graph.detect_cycles();

    if as_json {
        let cycles: Vec<Vec<String>> = cycles
            .iter()
            .map(|cycle| cycle.iter().map(ToString::to_string).collect())
            .collect();
        let report = json!({
            "modules": graph.module_count(),
            "edges": graph.edges(),
            "broken": graph.broken(),
            "cycles": cycles,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }
    for edge in graph.edges() {
        writeln!(out, "{} -> {} ({})", edge.from, edge.to, edge.kind.as_str())?;
    }
    for broken in graph.broken() {
        writeln!(out, "{} -> {} ({}): {}", broken.from, broken.uri, broken.kind.as_str(), broken.error)?;
    }
    for cycle in cycles {
        let names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        writeln!(out, "cycle: {}", names.join(" -> "))?;
    }
    Ok(())
}

/// Compare two annotations, resolved in `module` or the base module
pub fn subtype(
    workspace: &Workspace,
    left: &str,
    right: &str,
    module: Option<&Path>,
    out: &mut dyn Write,
) -> Result<()> {
    let resolver = workspace.resolver();
    let tree = match module {
        Some(path) => workspace.module(path)?,
        None => resolver.base_tree().clone(),
    };
    let parse = |text: &str| -> Result<TypeRef> {
        TypeRef::parse(text).with_context(|| format!("Invalid type '{}'", text))
    };
    let left = resolver.resolve_type_ref(&tree, NodeId::ROOT, &parse(left)?);
    let right = resolver.resolve_type_ref(&tree, NodeId::ROOT, &parse(right)?);
    let env: &dyn TypeEnv = resolver.as_ref();

    writeln!(out, "{} <: {}: {}", left, right, left.is_subtype_of(&right, env))?;
    writeln!(out, "{} <: {}: {}", right, left, right.is_subtype_of(&left, env))?;
    writeln!(out, "common subtype: {}", left.has_common_subtype_with(&right, env))?;
    Ok(())
}
