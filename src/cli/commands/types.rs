//! Node type commands.

use crate::cli::commands::Workspace;
use crate::cli::{Cli, TypeCommands};
use crate::error::{Error, Result};
use crate::model::NodeKind;

/// Execute type commands.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or the store fails.
pub fn execute(command: &TypeCommands, cli: &Cli, json: bool) -> Result<()> {
    match command {
        TypeCommands::Add {
            alias,
            media,
            properties,
            template,
        } => add(cli, alias, *media, properties, template.as_deref(), json),
        TypeCommands::List => list(cli, json),
    }
}

fn add(
    cli: &Cli,
    alias: &str,
    media: bool,
    properties: &[String],
    template: Option<&str>,
    json: bool,
) -> Result<()> {
    let alias = alias.trim();
    if alias.is_empty() {
        return Err(Error::InvalidArgument("Type alias cannot be empty".to_string()));
    }

    let kind = if media {
        NodeKind::Media
    } else {
        NodeKind::Content
    };

    let mut ws = Workspace::open(cli)?;
    ws.store.register_type(kind, alias, properties)?;
    if let Some(template) = template {
        ws.store.register_template(template)?;
    }

    if json {
        let output = serde_json::json!({
            "kind": kind,
            "alias": alias,
            "properties": properties,
            "template": template,
        });
        println!("{output}");
    } else {
        println!("Registered {kind} type: {alias}");
        if !properties.is_empty() {
            println!("  Properties: {}", properties.join(", "));
        }
        if let Some(template) = template {
            println!("  Template:   {template}");
        }
    }

    Ok(())
}

fn list(cli: &Cli, json: bool) -> Result<()> {
    let ws = Workspace::open(cli)?;
    let types = ws.store.list_types()?;

    if json {
        let output = serde_json::json!({
            "types": types,
            "count": types.len(),
        });
        println!("{output}");
    } else if types.is_empty() {
        println!("No node types registered.");
    } else {
        for node_type in &types {
            println!(
                "{:<8} {:<20} {}",
                node_type.kind.as_str(),
                node_type.alias,
                node_type.properties.join(", ")
            );
        }
    }

    Ok(())
}
