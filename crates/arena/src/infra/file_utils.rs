use log::info;
use std::{fs, io, path::Path};

/// Create the folder and any missing parents, a no-op when it already exists
pub fn create_folder(path: &str) -> Result<(), io::Error> {
    if Path::new(path).exists() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    info!("created folder {}", path);
    Ok(())
}
