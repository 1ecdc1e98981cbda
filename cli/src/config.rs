use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

const DB_ENV: &str = "SNAPCAL_DB";
const ANALYZER_ENV: &str = "SNAPCAL_ANALYZER";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    /// Program plus arguments used to analyze meal photos, if configured.
    pub analyzer_command: Option<Vec<String>>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "snapcal").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = std::env::var_os(DB_ENV)
            .map_or_else(|| data_dir.join("snapcal.db"), PathBuf::from);

        let analyzer_command = std::env::var(ANALYZER_ENV)
            .ok()
            .and_then(|cmd| parse_command(&cmd));

        Ok(Config {
            db_path,
            data_dir,
            analyzer_command,
        })
    }

    /// Load the API key from disk, or generate and store a new one.
    pub fn load_or_create_api_key(&self) -> Result<String> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok(key)
    }
}

/// Split a command line on whitespace. Blank input means "not configured".
pub(crate) fn parse_command(cmd: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() { None } else { Some(parts) }
}
