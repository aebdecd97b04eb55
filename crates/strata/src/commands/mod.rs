pub mod detect;
pub mod entries;
pub mod tree;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Detect the format of files, walking directories
    Detect(detect::DetectArgs),
    /// Print the field tree of a file
    Tree(tree::TreeArgs),
    /// List the files stored in an archive or disc image
    Entries(entries::EntriesArgs),
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Detect(detect) => detect.handle(),
            Commands::Tree(tree) => tree.handle(),
            Commands::Entries(entries) => entries.handle(),
        }
    }
}
