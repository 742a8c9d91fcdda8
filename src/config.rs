use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Keyboard shortcut bindings, read-only to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortcutBindings {
    #[serde(rename = "takeScreenshot")]
    pub take_screenshot: String,
    #[serde(rename = "uploadScreenshot")]
    pub upload_screenshot: String,
    #[serde(rename = "cancelAction")]
    pub cancel_action: String,
}

impl Default for ShortcutBindings {
    fn default() -> Self {
        Self {
            take_screenshot: "CommandOrControl+Shift+Q".to_string(),
            upload_screenshot: "CommandOrControl+Shift+U".to_string(),
            cancel_action: "Escape".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigCapConfig {
    #[serde(rename = "apiBaseUrl")]
    pub api_base_url: Option<String>,
    pub username: Option<String>,
    /// Where the capture provider drops screenshot files; also searched by
    /// the retry recovery heuristic
    #[serde(rename = "screenshotsDir")]
    pub screenshots_dir: Option<String>,
    /// Auto-hide duration for success/info notifications (errors persist)
    #[serde(rename = "notificationDuration")]
    pub notification_duration_ms: u64,
    #[serde(rename = "autoMinimizeAfterUpload")]
    pub auto_minimize_after_upload: bool,
    #[serde(default)]
    pub shortcuts: ShortcutBindings,
}

impl Default for SigCapConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            username: None,
            screenshots_dir: None,
            notification_duration_ms: 15_000,
            auto_minimize_after_upload: true,
            shortcuts: ShortcutBindings::default(),
        }
    }
}

impl SigCapConfig {
    /// Resolved screenshots directory, with `~` expansion; defaults to
    /// `~/.sigcap/screenshots`
    pub fn screenshots_dir(&self) -> PathBuf {
        match &self.screenshots_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => get_config_dir()
                .map(|d| d.join("screenshots"))
                .unwrap_or_else(|_| PathBuf::from("screenshots")),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(home_dir) = dirs::home_dir() {
        Ok(home_dir.join(".sigcap"))
    } else {
        Err("Could not find home directory".into())
    }
}

pub fn get_config_file_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(get_config_dir()?.join("config.json"))
}

pub fn get_logs_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(get_config_dir()?.join("logs"))
}

pub fn ensure_config_dir() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;

        // Set permissions to 700 (read/write/execute for owner only) on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(&config_dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(&config_dir, permissions)?;
        }
    }
    Ok(())
}

pub fn ensure_logs_dir() -> Result<(), Box<dyn std::error::Error>> {
    let logs_dir = get_logs_dir()?;
    if !logs_dir.exists() {
        fs::create_dir_all(&logs_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(&logs_dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(&logs_dir, permissions)?;
        }
    }
    Ok(())
}

pub fn load_config() -> Result<SigCapConfig, Box<dyn std::error::Error>> {
    ensure_config_dir()?;

    let config_file = get_config_file_path()?;

    if config_file.exists() {
        let content = fs::read_to_string(config_file)?;
        let config: SigCapConfig = serde_json::from_str(&content)?;
        Ok(config)
    } else {
        Ok(SigCapConfig::default())
    }
}

pub fn save_config(config: &SigCapConfig) -> Result<(), Box<dyn std::error::Error>> {
    ensure_config_dir()?;

    let config_file = get_config_file_path()?;
    let content = serde_json::to_string_pretty(config)?;

    fs::write(&config_file, content)?;

    // Set permissions to 600 (read/write for owner only) on Unix systems
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(&config_file)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(&config_file, permissions)?;
    }

    Ok(())
}
