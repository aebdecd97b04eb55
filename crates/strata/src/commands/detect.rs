use clap::Args;
use miette::Result;
use owo_colors::{OwoColorize, Stream::Stdout};
use std::path::PathBuf;
use tracing::warn;
use walkdir::WalkDir;

use crate::formats::{open, registry};

#[derive(Args)]
pub struct DetectArgs {
    /// Files or directories to inspect
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Show why each format rejected a file
    #[arg(long, default_value_t = false)]
    explain: bool,
}

impl DetectArgs {
    pub fn handle(&self) -> Result<()> {
        let registry = registry();

        let files = self
            .paths
            .iter()
            .flat_map(WalkDir::new)
            .filter_map(|e| e.map_err(|err| warn!("{err}")).ok())
            .filter(|e| !e.file_type().is_dir());

        for file in files {
            let path = file.path();
            let stream = match open(path) {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("{err:?}");
                    continue;
                }
            };

            match registry.detect(&stream) {
                Some(format) => println!(
                    "{}: {} ({})",
                    path.display(),
                    format.id.if_supports_color(Stdout, |text| text.green()),
                    format.description
                ),
                None => println!(
                    "{}: {}",
                    path.display(),
                    "unknown".if_supports_color(Stdout, |text| text.dimmed())
                ),
            }

            if self.explain {
                for (format, verdict) in registry.explain(&stream) {
                    match verdict {
                        Ok(()) => println!("  {}: accepted", format.id),
                        Err(reason) => println!(
                            "  {}: {}",
                            format.id,
                            reason.if_supports_color(Stdout, |text| text.red())
                        ),
                    }
                }
            }
        }
        Ok(())
    }
}
