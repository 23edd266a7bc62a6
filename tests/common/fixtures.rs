//! Archive fixtures and test configuration

use flate2::Compression;
use flate2::write::GzEncoder;
use metadata_harvest::Config;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Wheel containing a payload module and a `.dist-info` directory
pub fn wheel_bytes(name: &str, version: &str) -> Vec<u8> {
    let dist_info = format!("{name}-{version}.dist-info");
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let entries = [
        (format!("{name}/__init__.py"), "VERSION = 1\n".to_string()),
        (
            format!("{dist_info}/METADATA"),
            format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n"),
        ),
        (format!("{dist_info}/WHEEL"), "Wheel-Version: 1.0\n".to_string()),
        (format!("{dist_info}/RECORD"), String::new()),
    ];
    for (path, content) in entries {
        writer.start_file(path, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

/// Source distribution with PKG-INFO, pyproject.toml and a setup.py
pub fn sdist_bytes(name: &str, version: &str) -> Vec<u8> {
    let root = format!("{name}-{version}");
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let entries = [
        (
            format!("{root}/PKG-INFO"),
            format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n"),
        ),
        (
            format!("{root}/pyproject.toml"),
            format!("[project]\nname = \"{name}\"\nversion = \"{version}\"\n"),
        ),
        (
            format!("{root}/setup.py"),
            "from setuptools import setup\nsetup()\n".to_string(),
        ),
    ];
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Config rooted in `data_dir` with fast retries
pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.harvest.data_dir = data_dir.to_path_buf();
    config.harvest.catalog_path = data_dir.join("files.json");
    config.harvest.max_concurrent_projects = 8;
    config.harvest.extraction_workers = 2;
    config.network.retry.max_attempts = 2;
    config.network.retry.initial_delay = Duration::from_millis(10);
    config.network.retry.max_delay = Duration::from_millis(50);
    config.network.retry.jitter = false;
    config.network.request_timeout = Duration::from_secs(10);
    config
}

/// Relative paths of every regular file under `root`, sorted
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}
