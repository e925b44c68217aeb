#![allow(dead_code)]

use anyhow::Result;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes `text` as `name` inside `dir` and returns its path.
pub fn write_file(dir: &TempDir, name: &str, text: &str) -> Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, text)?;
    Ok(path)
}

/// CTF file with `count` sequences; sequence `i` has `i % 3 + 1` steps.
///
/// Every step of sequence `i` has features `[i, i, i]` (alias `x`) and the
/// sparse label `i % 4` (alias `y`, dimension 4).
pub fn ctf_fixture(dir: &TempDir, count: usize) -> Result<PathBuf> {
    let mut text = String::new();
    for i in 0..count {
        for _ in 0..(i % 3 + 1) {
            text.push_str(&format!("{}\t|x {} {} {} |y {}:1\n", i, i, i, i, i % 4));
        }
    }
    write_file(dir, "data.ctf", &text)
}

/// Total steps in [`ctf_fixture`] for `count` sequences.
pub fn ctf_fixture_samples(count: usize) -> usize {
    (0..count).map(|i| i % 3 + 1).sum()
}

/// Image map with `count` RGB images; image `i` has red value `i * 10` and
/// class `i % classes`.
pub fn image_fixture(dir: &Path, count: usize, classes: usize) -> Result<PathBuf> {
    let mut map = String::new();
    for i in 0..count {
        let name = format!("image_{}.png", i);
        let img = RgbImage::from_pixel(16, 12, Rgb([(i * 10) as u8, 50, 100]));
        img.save(dir.join(&name))?;
        map.push_str(&format!("{}\t{}\n", name, i % classes));
    }
    let map_path = dir.join("map.txt");
    std::fs::write(&map_path, map)?;
    Ok(map_path)
}
