/// Canonical file paths for OpenClose data files.
///
/// The config file lives under %APPDATA%\OpenClose\ on Windows and falls back
/// to $HOME/.config/OpenClose/ elsewhere.
use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

const APP_DIR_NAME: &str = "OpenClose";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns the OpenClose application data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    app_data_dir_from(std::env::var_os("APPDATA"), std::env::var_os("HOME"))
        .ok_or_else(|| anyhow!("neither APPDATA nor HOME is set; pass --config"))
}

/// Returns the full path to the config file: <app data>/OpenClose/config.toml
pub fn config_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join(CONFIG_FILE_NAME))
}

fn app_data_dir_from(appdata: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let non_empty = |v: OsString| (!v.is_empty()).then_some(v);
    if let Some(appdata) = appdata.and_then(non_empty) {
        return Some(PathBuf::from(appdata).join(APP_DIR_NAME));
    }
    home.and_then(non_empty)
        .map(|home| PathBuf::from(home).join(".config").join(APP_DIR_NAME))
}
