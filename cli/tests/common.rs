#![allow(dead_code)]

use std::path::Path;

/// Write `contents` to `<dir>/<name>` and return the full path
pub fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

/// A uvicorn project directory with an empty `main.py`
pub fn uvicorn_project(root: &Path, name: &str) {
    write_file(&root.join(name), "main.py", "");
}
