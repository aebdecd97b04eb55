use chrono::NaiveDateTime;
use clap::Args;
use itertools::Itertools;
use miette::{miette, Result};
use owo_colors::{OwoColorize, Stream::Stdout};
use std::path::PathBuf;
use strata_core::ParseOptions;
use strata_iso::IsoImage;
use strata_rar::{ArchiveInfo, RarArchive};
use tracing::debug;

use crate::formats::{open, registry};

#[derive(Args)]
pub struct EntriesArgs {
    /// An input archive or disc image
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Stop after this many entries
    #[arg(short, long)]
    max: Option<usize>,

    /// Fail on the first malformed entry instead of skipping it
    #[arg(long, default_value_t = false)]
    strict: bool,
}

impl EntriesArgs {
    pub fn handle(&self) -> Result<()> {
        let stream = open(&self.file)?;
        let options = ParseOptions::builder()
            .maybe_max_entries(self.max)
            .strict(self.strict)
            .build();

        match registry().detect(&stream).map(|format| format.id) {
            Some("rar") => list_rar(RarArchive::with_options(stream, options)?),
            Some("iso9660") => list_iso(IsoImage::with_options(stream, options)?),
            _ => {
                debug!("no signature at the start, searching for an embedded archive");
                match RarArchive::locate(stream, options) {
                    Ok(archive) => list_rar(archive),
                    Err(strata_rar::Error::InvalidArchive) => Err(miette!(
                        "{}: not a supported archive or disc image",
                        self.file.display()
                    )),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }
}

fn timestamp(value: Option<NaiveDateTime>) -> String {
    value.map_or_else(|| "-".repeat(19), |ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Variant and archive flags on one line
fn rar_summary(info: &ArchiveInfo) -> String {
    let mut traits = vec![info.variant.to_string()];
    if !info.has_main_header {
        traits.push("no main header".to_owned());
    }
    for (set, name) in [
        (info.is_volume, "volume"),
        (info.is_solid, "solid"),
        (info.is_locked, "locked"),
        (info.has_encrypted_headers, "encrypted headers"),
        (info.has_recovery_record, "recovery record"),
    ] {
        if set {
            traits.push(name.to_owned());
        }
    }
    traits.iter().join(", ")
}

fn list_rar(mut archive: RarArchive) -> Result<()> {
    let info = archive.info()?;
    println!("{}", rar_summary(&info).if_supports_color(Stdout, |text| text.bold()));
    if !info.services.is_empty() {
        println!("services: {}", info.services.iter().join(", "));
    }

    for entry in archive.entries()? {
        let name = if entry.is_directory {
            format!("{}/", entry.filename)
        } else {
            entry.filename.clone()
        };
        println!(
            "{:>12} {:>12} {} {:08x} {}{}",
            entry.size,
            entry.compressed_size,
            timestamp(entry.modified),
            entry.crc32,
            name,
            if entry.is_encrypted { " (encrypted)" } else { "" }
        );
    }
    Ok(())
}

fn list_iso(mut image: IsoImage) -> Result<()> {
    let info = image.volume_info()?;
    let mut title = info.volume_id.clone();
    if let (Some(level), Some(name)) = (info.joliet, &info.joliet_volume_id) {
        title.push_str(&format!(" [{level}: {name}]"));
    }
    println!("{}", title.if_supports_color(Stdout, |text| text.bold()));

    for entry in image.entries()? {
        let name = if entry.is_directory {
            format!("{}/", entry.path)
        } else {
            entry.path.clone()
        };
        println!(
            "{:>12} {} {}",
            entry.size,
            timestamp(entry.modified.or(entry.recorded)),
            name
        );
    }
    Ok(())
}
