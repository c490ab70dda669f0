//! Init command - scaffold a new capsule project
//!
//! 1. Build and validate a config from the flags
//! 2. Create the directories for every configured path
//! 3. Write the torrc, HTML layout and a first gemtext page if missing
//! 4. Write the config file

use super::InitArgs;
use crate::config::{save_to_path, validate, Config};
use crate::util::fs::{create_parent_dir, create_private_dir, write_private};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_TORRC: &str = include_str!("../../templates/torrc");
const DEFAULT_LAYOUT: &str = include_str!("../../templates/layout.html");
const DEFAULT_INDEX: &str = "# Default Bergelmir Gemini Page\n\nYou should edit this page.\n";
const TOR_DATA_DIRECTORY: &str = "tor/data";

/// Config described by the init flags
pub fn build_config(args: &InitArgs) -> Result<Config> {
    let host = if args.public { "0.0.0.0" } else { "127.0.0.1" };

    let mut config = Config::default();
    config.tor.enabled = args.tor;
    config.gemini.domain_names = args.domains.clone();
    config.gemini.listening_location = format!("{}:{}", host, args.gemini_port);

    if let Some(source) = &args.rss_source {
        config.rss.enabled = true;
        config.rss.feed_source_gemini_path = source.trim_start_matches('/').to_string();
    }

    config.http.enabled = args.http;
    config.http.listening_location = format!("{}:{}", host, args.http_port);
    config.http.default_page_title = args.page_title.clone();

    if args.http && args.http_port == args.gemini_port {
        bail!("--http-port cannot equal --gemini-port ({})", args.gemini_port);
    }
    validate(&config)?;
    Ok(config)
}

/// Run the init command
pub fn run_init(config_path: &Path, args: &InitArgs) -> Result<()> {
    println!("🔧 Initializing Bergelmir project...\n");

    let config = build_config(args)?;
    let root = config_path.parent().unwrap_or_else(|| Path::new(""));
    let created = scaffold(&config, root, config_path, args.force)?;

    for path in &created {
        println!("💾 Created {:?}", path);
    }
    println!("💾 Saved configuration to {:?}", config_path);

    println!("\n{}", "=".repeat(60));
    println!("✅ Bergelmir project initialized!\n");
    println!("📋 Next Steps:");
    println!(
        "   1. Edit your capsule in {:?}",
        root.join(&config.gemini.data_path)
    );
    if config.tor.enabled {
        println!("   2. Make sure tor is installed; bergelmir starts it with");
        println!("      {:?}", root.join(&config.tor.torrc_path));
    }
    println!("   Start serving from {:?} with: bergelmir run\n", root);

    info!("Project initialized at {:?}", config_path);
    Ok(())
}

/// Write the project files for `config` under `root`
///
/// Paths inside `config` stay relative; `root` is only where they are
/// created now. Existing templates and pages are left alone. Returns the
/// files that were created.
pub fn scaffold(config: &Config, root: &Path, config_path: &Path, force: bool) -> Result<Vec<PathBuf>> {
    if config_path.exists() && !force {
        bail!(
            "{:?} already exists. Re-run with --force to overwrite it",
            config_path
        );
    }

    let mut created = Vec::new();
    let at = |path: &Path| root.join(path);

    let tor = &config.tor;
    for path in [
        &tor.torrc_path,
        &tor.control_port_file_path,
        &tor.control_auth_cookie_path,
        &tor.hidden_service_private_key_path,
        &config.gemini.tls.cert_path,
        &config.gemini.tls.key_path,
        &config.http.layout_html_path,
    ] {
        create_parent_dir(&at(path))?;
    }
    create_private_dir(&at(&config.gemini.data_path))?;
    create_private_dir(&at(&config.http.data_path))?;

    let torrc = at(&tor.torrc_path);
    if tor.enabled && !torrc.exists() {
        create_private_dir(&at(Path::new(TOR_DATA_DIRECTORY)))?;
        let contents = DEFAULT_TORRC
            .replace("%DATA_DIRECTORY%", TOR_DATA_DIRECTORY)
            .replace("%CONTROL_PORT_FILE%", &path_text(&tor.control_port_file_path))
            .replace("%COOKIE_AUTH_FILE%", &path_text(&tor.control_auth_cookie_path));
        write_private(&torrc, contents.as_bytes())?;
        created.push(torrc);
    }

    let data = at(&config.gemini.data_path);
    if !data.join("index.gmi").exists() && !data.join("index.gemini").exists() {
        let index = data.join("index.gmi");
        std::fs::write(&index, DEFAULT_INDEX)
            .with_context(|| format!("Unable to write {:?}", index))?;
        created.push(index);
    }

    let layout = at(&config.http.layout_html_path);
    if config.http.enabled && !layout.exists() {
        std::fs::write(&layout, DEFAULT_LAYOUT)
            .with_context(|| format!("Unable to write {:?}", layout))?;
        created.push(layout);
    }

    save_to_path(config, config_path)?;
    Ok(created)
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_path;

    fn args() -> InitArgs {
        InitArgs {
            tor: true,
            domains: vec!["example.org".to_string()],
            gemini_port: 1965,
            public: false,
            http: true,
            http_port: 8080,
            rss_source: Some("/blog".to_string()),
            page_title: "My Capsule".to_string(),
            force: false,
        }
    }

    #[test]
    fn test_build_config() {
        let config = build_config(&args()).unwrap();
        assert!(config.tor.enabled);
        assert_eq!(config.gemini.listening_location, "127.0.0.1:1965");
        assert_eq!(config.http.listening_location, "127.0.0.1:8080");
        assert!(config.rss.enabled);
        assert_eq!(config.rss.feed_source_gemini_path, "blog");

        let public = InitArgs {
            public: true,
            ..args()
        };
        assert_eq!(
            build_config(&public).unwrap().gemini.listening_location,
            "0.0.0.0:1965"
        );
    }

    #[test]
    fn test_port_clash_rejected() {
        let clash = InitArgs {
            http_port: 1965,
            ..args()
        };
        assert!(build_config(&clash).is_err());
    }

    #[test]
    fn test_scaffold_writes_project() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let config = build_config(&args()).unwrap();

        let created = scaffold(&config, dir.path(), &config_path, false).unwrap();
        assert_eq!(created.len(), 3);

        let torrc = std::fs::read_to_string(dir.path().join("tor/torrc")).unwrap();
        assert!(torrc.contains("ControlPortWriteToFile tor/control_port"));
        assert!(torrc.contains("CookieAuthFile tor/control_auth_cookie"));
        assert!(!torrc.contains('%'));

        let layout = std::fs::read_to_string(dir.path().join("http/layout.html")).unwrap();
        assert!(layout.contains("%GEMINI_CONTENT%"));
        assert!(dir.path().join("gemini/index.gmi").exists());
        assert!(dir.path().join("tls").is_dir());

        let loaded = load_from_path(&config_path).unwrap();
        assert_eq!(loaded.gemini.domain_names, ["example.org"]);
        assert_eq!(loaded.http.default_page_title, "My Capsule");
    }

    #[test]
    fn test_refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "# hand edited\n").unwrap();
        std::fs::create_dir(dir.path().join("gemini")).unwrap();
        std::fs::write(dir.path().join("gemini/index.gmi"), "# Mine\n").unwrap();
        let config = build_config(&args()).unwrap();

        assert!(scaffold(&config, dir.path(), &config_path, false).is_err());
        assert_eq!(
            std::fs::read_to_string(&config_path).unwrap(),
            "# hand edited\n"
        );

        scaffold(&config, dir.path(), &config_path, true).unwrap();
        assert!(load_from_path(&config_path).is_ok());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("gemini/index.gmi")).unwrap(),
            "# Mine\n"
        );
    }
}
