use clap::Subcommand;
use printvault_core::config::VaultConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write the default configuration file if none exists
    Init,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = VaultConfig::load()?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
            Ok(())
        }
        ConfigAction::Init => {
            let home = VaultConfig::init()?;
            println!("Configuration written under {}", home.display());
            Ok(())
        }
    }
}
