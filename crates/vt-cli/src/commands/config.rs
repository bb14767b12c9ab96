use vt_core::config::Config;
use vt_core::settings::SettingsManager;

/// Print the effective configuration.
pub fn show(config: &Config, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

/// Write a default config file.
pub fn init(settings: &SettingsManager, force: bool) -> anyhow::Result<()> {
    let path = settings.path();
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    settings.save(&Config::default())?;
    println!("Wrote {}", path.display());
    Ok(())
}
