use std::path::Path;

use clap::Parser;
use color_eyre::Result;
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Color, Table,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use rtcemu::{
    ApplyResult, CreateResult, DestroyResult, ImpairmentSpec, Lab, ShowResult,
};

use crate::config::Config;

#[derive(Debug, Parser)]
pub struct LabCommand {
    #[clap(subcommand)]
    command: LabCommands,
}

#[derive(Debug, clap::Subcommand)]
enum LabCommands {
    /// Create a bridge and N node namespaces behind it
    Create {
        /// Number of nodes to create
        #[clap(long, default_value_t = 1)]
        nodes: usize,
    },

    /// Replace a node's impairments
    Apply {
        /// Node to shape, e.g. node1
        #[clap(long)]
        node: String,

        /// One-way delay, e.g. 50ms
        #[clap(long)]
        delay: Option<String>,

        /// Packet loss, e.g. 1%
        #[clap(long)]
        loss: Option<String>,

        /// Delay variation, e.g. 10ms (needs --delay)
        #[clap(long)]
        jitter: Option<String>,

        /// Bandwidth limit, e.g. 2mbit
        #[clap(long)]
        bw: Option<String>,
    },

    /// Remove a node's impairments
    Clear {
        #[clap(long)]
        node: String,
    },

    /// Show every node and its current impairments
    Show,

    /// Tear the lab down
    Destroy,
}

pub async fn exec(config_path: &Path, json: bool, cmd: LabCommand) -> Result<()> {
    let config = Config::load(config_path)?;
    let lab = Lab::system(config.lab);
    let cancel = cancel_on_interrupt();

    match cmd.command {
        LabCommands::Create { nodes } => {
            let result = lab.create(&cancel, nodes).await?;
            if json {
                print_json(&result)?;
            } else {
                print_create(&result);
            }
        }

        LabCommands::Apply {
            node,
            delay,
            loss,
            jitter,
            bw,
        } => {
            let spec = ImpairmentSpec {
                node,
                delay,
                jitter,
                loss,
                bandwidth: bw,
            };
            let result = lab.apply(&cancel, &spec).await?;
            if json {
                print_json(&result)?;
            } else {
                print_apply(&result);
            }
        }

        LabCommands::Clear { node } => {
            let cleared = lab.clear(&cancel, &node).await?;
            if json {
                print_json(&serde_json::json!({ "node": node.trim(), "cleared": cleared }))?;
            } else if cleared {
                println!("Cleared impairments on {}", node.trim());
            } else {
                println!("{} had no impairments", node.trim());
            }
        }

        LabCommands::Show => {
            let result = lab.show(&cancel).await?;
            if json {
                print_json(&result)?;
            } else {
                print_show(&result);
            }
        }

        LabCommands::Destroy => {
            let result = lab.destroy(&cancel).await?;
            if json {
                print_json(&result)?;
            } else {
                print_destroy(&result);
            }
        }
    };

    Ok(())
}

/// A token that is cancelled on the first Ctrl-C. Work already started runs
/// to completion, and a partially created lab is rolled back.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current step");
            on_interrupt.cancel();
        }
    });

    cancel
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();

    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(comfy_table::ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );

    table
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn print_create(result: &CreateResult) {
    let mut table = new_table(&["Node", "IP"]);
    for node in &result.nodes {
        table.add_row(vec![Cell::new(&node.name), Cell::new(node.ip)]);
    }

    println!("Bridge: {}", result.bridge);
    println!("{table}");

    if result.internet_reachable {
        println!("Internet: reachable from node1");
    } else {
        println!("Internet: not reachable from node1 (lab traffic still works)");
    }
}

fn print_apply(result: &ApplyResult) {
    let mut parts = Vec::new();
    for (name, value) in [
        ("delay", &result.delay),
        ("jitter", &result.jitter),
        ("loss", &result.loss),
        ("rate", &result.bw),
    ] {
        if let Some(value) = value {
            parts.push(format!("{name}={value}"));
        }
    }

    println!("Applied to {}: {}", result.node, parts.join(" "));
}

fn print_show(result: &ShowResult) {
    let mut table = new_table(&[
        "Node", "Interface", "Delay", "Jitter", "Loss", "Rate", "Qdisc",
    ]);

    for node in &result.nodes {
        let shaped = node.raw_qdisc != rtcemu::show::NO_QDISC;
        let name = if shaped {
            Cell::new(&node.name)
                .fg(Color::Yellow)
                .add_attribute(Attribute::Bold)
        } else {
            Cell::new(&node.name)
        };

        table.add_row(vec![
            name,
            Cell::new(&node.interface),
            Cell::new(or_dash(&node.delay)),
            Cell::new(or_dash(&node.jitter)),
            Cell::new(or_dash(&node.loss)),
            Cell::new(or_dash(&node.bw)),
            Cell::new(&node.raw_qdisc),
        ]);
    }

    println!("Bridge: {}  Subnet: {}", result.bridge, result.subnet);
    println!("{table}");
}

fn print_destroy(result: &DestroyResult) {
    if result.state_missing_fallback {
        println!("No lab state found; removed leftovers by name only");
    }

    if result.nodes_deleted.is_empty() {
        println!("Namespaces deleted: none");
    } else {
        println!("Namespaces deleted: {}", result.nodes_deleted.join(", "));
    }

    println!(
        "Bridge deleted: {}",
        if result.bridge_deleted { "yes" } else { "no" }
    );

    if result.ip_forward_restored {
        println!(
            "Restored net.ipv4.ip_forward={}",
            result.ip_forward_restore_value
        );
    }
}
