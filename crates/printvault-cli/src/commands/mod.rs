pub mod add;
pub mod collection;
pub mod config;
pub mod events;
pub mod files;
pub mod init;
pub mod job;
pub mod scan;
pub mod slicer;
pub mod tag;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Initialize PrintVault (~/.printvault with config, database, library)
    Init,
    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },
    /// Add a file to the library
    Add(add::AddArgs),
    /// Scan a watched folder into the library
    Scan(scan::ScanArgs),
    /// Browse and manage library files
    Files {
        #[command(subcommand)]
        action: files::FilesAction,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        action: tag::TagAction,
    },
    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: collection::CollectionAction,
    },
    /// Manage slicer installations and profiles
    Slicer {
        #[command(subcommand)]
        action: slicer::SlicerAction,
    },
    /// Manage the slicing job queue
    Job {
        #[command(subcommand)]
        action: job::JobAction,
    },
    /// Show recent events
    Events(events::EventsArgs),
}

pub fn run(cmd: Command, json: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Init => init::run(),
        Command::Config { action } => config::run(action),
        Command::Add(args) => add::run(args, json),
        Command::Scan(args) => scan::run(args, json),
        Command::Files { action } => files::run(action, json),
        Command::Tag { action } => tag::run(action, json),
        Command::Collection { action } => collection::run(action, json),
        Command::Slicer { action } => slicer::run(action, json),
        Command::Job { action } => job::run(action, json),
        Command::Events(args) => events::run(args, json),
    }
}
