//! Node management commands.
//!
//! These edit the persisted registry directly. A running `monitor` keeps its
//! own copy and writes it back on exit.

use anyhow::{Result, bail};
use smartguard_core::{NewNode, NodePatch, NodeRegistry, SafetyState};
use smartguard_store::Store;
use time::OffsetDateTime;

use crate::cli::{NodesAction, OutputFormat};
use crate::format::{as_json, format_nodes_text};
use crate::style;
use crate::util::write_output;

pub fn cmd_nodes(store: &Store, action: NodesAction, no_color: bool) -> Result<()> {
    let mut registry = NodeRegistry::from_nodes(store.load_nodes()?);

    match action {
        NodesAction::List { format } => {
            let settings = store.load_settings()?;
            let gateway = SafetyState::new(settings, Vec::new())
                .snapshot()
                .gateway_node();
            let mut nodes = vec![gateway];
            nodes.extend(registry.list().iter().cloned());

            let content = match format {
                OutputFormat::Json => as_json(&nodes)?,
                OutputFormat::Text => {
                    format_nodes_text(&nodes, OffsetDateTime::now_utc(), no_color)
                }
                OutputFormat::Csv => bail!("CSV output is not supported for nodes"),
            };
            write_output(None, &content)
        }
        NodesAction::Add {
            name,
            location,
            device_id,
        } => {
            let new = NewNode {
                name,
                location,
                device_id,
            };
            let Some(node) = registry.add(new) else {
                bail!("Device is already registered.");
            };
            store.save_nodes(registry.list())?;
            println!(
                "{}",
                style::format_success(
                    &format!("Device \"{}\" added with id {}.", node.name, node.id),
                    no_color
                )
            );
            Ok(())
        }
        NodesAction::Update {
            id,
            name,
            location,
            battery,
            signal,
        } => {
            let patch = NodePatch {
                name,
                location,
                battery,
                signal,
                status: None,
            };
            if patch.is_empty() {
                bail!("Nothing to update. Pass --name, --location, --battery or --signal.");
            }
            if registry.update(&id, patch).is_none() {
                bail!("No node with id '{id}'.");
            }
            store.save_nodes(registry.list())?;
            println!("{}", style::format_success("Node updated.", no_color));
            Ok(())
        }
        NodesAction::Remove { id } => {
            if registry.remove(&id).is_none() {
                bail!("No node with id '{id}'.");
            }
            store.save_nodes(registry.list())?;
            println!(
                "{}",
                style::format_info("Device removed from network.", no_color)
            );
            Ok(())
        }
    }
}
