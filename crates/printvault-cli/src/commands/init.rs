use printvault_core::config::VaultConfig;

pub fn run() -> anyhow::Result<()> {
    let home = VaultConfig::init()?;
    println!("PrintVault initialized at {}", home.display());

    let db_path = VaultConfig::db_path()?;
    let _conn = printvault_db::open_db(&db_path)?;
    println!("Database created at {}", db_path.display());

    let config = VaultConfig::load()?;
    let library_root = config.library_root()?;
    std::fs::create_dir_all(&library_root)?;
    println!("Library root at {}", library_root.display());

    Ok(())
}
