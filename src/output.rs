use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Top-level entries the build owns inside the output directory.
pub const GENERATED_DIRS: &[&str] = &["match", "channel", "day"];
pub const GENERATED_FILES: &[&str] = &["index.html", "sitemap.xml"];

/// Writes through a sibling temp file and a rename, so readers never see a
/// partially written file at `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

/// Removes pages left by a previous run so the tree holds only this run's
/// output. Unrelated files in `out_dir` are left alone.
pub fn clean_generated(out_dir: &Path) -> Result<()> {
    for dir in GENERATED_DIRS {
        let path = out_dir.join(dir);
        if path.is_dir() {
            fs::remove_dir_all(&path).with_context(|| format!("remove {}", path.display()))?;
        }
    }
    for file in GENERATED_FILES {
        let path = out_dir.join(file);
        if path.is_file() {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Generated `index.html` pages under `out_dir`, keyed by public URL. Only
/// the root page and the generated directories are walked, so hand-placed
/// pages elsewhere in `out_dir` are never reported.
pub fn generated_pages(out_dir: &Path, site_url: &str) -> Result<BTreeMap<String, PathBuf>> {
    let site = site_url.trim_end_matches('/');
    let mut pages = BTreeMap::new();
    if !out_dir.is_dir() {
        return Ok(pages);
    }
    let walker = WalkDir::new(out_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() != 1
                || !e.file_type().is_dir()
                || e.file_name().to_str().is_some_and(|n| GENERATED_DIRS.contains(&n))
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", out_dir.display()))?;
        if !entry.file_type().is_file() || entry.file_name() != "index.html" {
            continue;
        }
        let rel = entry.path().strip_prefix(out_dir).unwrap_or(entry.path());
        let parts: Vec<String> = rel
            .parent()
            .map(|dir| {
                dir.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        let url = if parts.is_empty() {
            format!("{site}/")
        } else {
            format!("{site}/{}/", parts.join("/"))
        };
        pages.insert(url, entry.into_path());
    }
    Ok(pages)
}

/// Public URL of every generated page under `out_dir`.
pub fn materialized_urls(out_dir: &Path, site_url: &str) -> Result<BTreeSet<String>> {
    Ok(generated_pages(out_dir, site_url)?.into_keys().collect())
}

/// Deletes generated pages whose URL is not in `keep`. Returns how many
/// were removed.
pub fn prune_stale_pages(out_dir: &Path, site_url: &str, keep: &BTreeSet<String>) -> Result<usize> {
    let mut removed = 0;
    for (url, path) in generated_pages(out_dir, site_url)? {
        if keep.contains(&url) {
            continue;
        }
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        removed += 1;
    }
    Ok(removed)
}
