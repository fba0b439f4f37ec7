//! Artifact status report (`te -s`)
//!
//! Answers "did my last build actually land": Python extension module,
//! C++ test binary, and an import smoke test against the live interpreter.

use crate::output::{human_size, CYAN, GREEN, GREY, RED, RESET};
use std::path::{Path, PathBuf};
use te_foundation::TeConfig;

/// Print the three-part artifact report
pub async fn print_report(config: &TeConfig) {
    println!("{}🔍 TE Environment Check{}", GREEN, RESET);

    println!("   {}├─ [1] Python Build Artifact:{}", GREY, RESET);
    match find_extension(&config.te_path) {
        Some(path) => print_artifact(&path),
        None => println!(
            "   {}│      └─ Status:{} {}Not Found (Build failed?){}",
            GREY, RESET, RED, RESET
        ),
    }

    println!("   {}├─ [2] C++ Test Binary:{}", GREY, RESET);
    let cpp_bin = config.te_path.join("tests/cpp/build/operator/test_operator");
    if cpp_bin.is_file() {
        print_artifact(&cpp_bin);
    } else {
        println!(
            "   {}│      └─ Status:{} {}Not Found (C++ Tests not built){}",
            GREY, RESET, RED, RESET
        );
    }

    println!("   {}└─ [3] Python Import Check:{}", GREY, RESET);
    print_import_check().await;
}

/// `transformer_engine_torch*.so` within two directory levels of the repo
fn find_extension(te_path: &Path) -> Option<PathBuf> {
    find_matching(te_path, 2, &|name| {
        name.starts_with("transformer_engine_torch") && name.ends_with(".so")
    })
}

fn find_matching(dir: &Path, depth: usize, matches: &dyn Fn(&str) -> bool) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            if matches(&entry.file_name().to_string_lossy()) {
                return Some(path);
            }
        } else if path.is_dir() && depth > 1 {
            subdirs.push(path);
        }
    }
    subdirs
        .into_iter()
        .find_map(|sub| find_matching(&sub, depth - 1, matches))
}

fn print_artifact(path: &Path) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    println!(
        "   {}│      ├─ File:{}     {}{}{}",
        GREY, RESET, GREEN, name, RESET
    );
    if let Ok(meta) = std::fs::metadata(path) {
        println!(
            "   {}│      ├─ Size:{}     {}{}{}",
            GREY,
            RESET,
            CYAN,
            human_size(meta.len()),
            RESET
        );
        if let Ok(modified) = meta.modified() {
            let when: chrono::DateTime<chrono::Local> = modified.into();
            println!(
                "   {}│      └─ Modified:{} {}{}{}",
                GREY,
                RESET,
                CYAN,
                when.format("%Y-%m-%d %H:%M:%S"),
                RESET
            );
        }
    }
}

async fn print_import_check() {
    let result = tokio::process::Command::new("python3")
        .arg("-c")
        .arg("import transformer_engine; print(transformer_engine.__file__)")
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            let location = String::from_utf8_lossy(&output.stdout).trim().to_string();
            println!(
                "          └─ Result: {}Success{} -> {}{}{}",
                GREEN, RESET, CYAN, location, RESET
            );
        }
        _ => {
            println!("          └─ Result: {}Import Failed!{}", RED, RESET);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_extension_two_levels_deep() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("transformer_engine");
        std::fs::create_dir(&nested).unwrap();
        let so = nested.join("transformer_engine_torch.cpython-310.so");
        std::fs::write(&so, b"").unwrap();

        assert_eq!(find_extension(dir.path()), Some(so));
    }

    #[test]
    fn test_find_extension_respects_depth() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("a/b/c");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("transformer_engine_torch.so"), b"").unwrap();

        assert_eq!(find_extension(dir.path()), None);
    }

    #[test]
    fn test_find_extension_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("libother.so"), b"").unwrap();
        assert_eq!(find_extension(dir.path()), None);
    }
}
