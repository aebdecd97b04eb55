use clap::Args;
use miette::{IntoDiagnostic, Result};
use owo_colors::{OwoColorize, Stream::Stdout};
use std::path::PathBuf;
use strata_core::{FieldSet, Node, ParseOptions};
use tracing::info;

use crate::formats::{open, registry};

#[derive(Args)]
pub struct TreeArgs {
    /// An input file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Levels of nested sets to expand
    #[arg(short, long, default_value_t = 2)]
    depth: usize,

    /// Print the tree as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl TreeArgs {
    pub fn handle(&self) -> Result<()> {
        let stream = open(&self.file)?;
        let registry = registry();
        let (format, mut root) = registry.parse(stream, &ParseOptions::default())?;
        info!("{} is {}", self.file.display(), format.description);

        expand(&mut root, self.depth);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&root).into_diagnostic()?);
        } else {
            print(&root, 0, self.depth);
        }
        Ok(())
    }
}

/// Produce `set` and its nested sets down to `depth` levels, keeping whatever parsed
fn expand(set: &mut FieldSet, depth: usize) {
    set.materialize_tolerant();
    if depth == 0 {
        return;
    }
    for node in set.iter_mut() {
        if let Some(child) = node.as_set_mut() {
            expand(child, depth - 1);
        }
    }
}

/// Byte offset, with the bit when the address is not byte aligned
fn address(bits: u64) -> String {
    match bits % 8 {
        0 => format!("{:08x}", bits / 8),
        bit => format!("{:08x}.{bit}", bits / 8),
    }
}

fn print(set: &FieldSet, indent: usize, depth: usize) {
    let pad = "  ".repeat(indent);
    for warning in set.warnings() {
        println!(
            "{:8} {pad}{}",
            "",
            format!("warning: {warning}").if_supports_color(Stdout, |text| text.yellow())
        );
    }
    for node in set.iter() {
        let at = address(node.address());
        match node {
            Node::Field(field) => {
                let mut line = format!(
                    "{at} {pad}{} = {}",
                    field.name().if_supports_color(Stdout, |text| text.cyan()),
                    field.display()
                );
                if let Some(description) = field.description() {
                    line.push_str(&format!(
                        " {}",
                        format!("({description})").if_supports_color(Stdout, |text| text.dimmed())
                    ));
                }
                println!("{line}");
            }
            Node::Set(child) => {
                let mut line = format!(
                    "{at} {pad}{} <{}>",
                    child.name().if_supports_color(Stdout, |text| text.bold()),
                    child.type_name()
                );
                if let Some(description) = child.description() {
                    line.push_str(&format!(": {description}"));
                }
                println!("{line}");
                if depth > 0 {
                    print(child, indent + 1, depth - 1);
                } else if !child.is_empty() || !child.is_complete() {
                    println!("{:8} {pad}  ...", "");
                }
            }
        }
    }
}
