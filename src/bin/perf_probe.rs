use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;

#[path = "../error.rs"]
mod error;
#[path = "../processing/mod.rs"]
mod processing;
#[path = "../raster.rs"]
mod raster;
#[path = "../state.rs"]
mod state;

use raster::RasterBuffer;
use state::{AdjustmentParams, AspectRatio, Upscale};

const PHOTO_EXTS: &[&str] = &["jpg", "jpeg", "png"];
const EXPORT_QUALITY: u8 = 95;

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    let Some(ext) = path.extension().map(|e| e.to_string_lossy()) else {
        return false;
    };
    exts.iter().any(|known| ext.eq_ignore_ascii_case(known))
}

fn list_photos(dir: &Path, limit: usize) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read_dir failed for {}", dir.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_extension(p, PHOTO_EXTS))
        .collect();
    files.sort();
    files.truncate(limit);
    Ok(files)
}

fn median_ms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

/// Touches every stage of the chain.
fn build_params() -> AdjustmentParams {
    AdjustmentParams {
        brightness: 1.1,
        contrast: 1.15,
        saturation: 0.9,
        sharpness: 1.3,
        crop: Some(AspectRatio::new(4.0, 5.0)),
        rotate: 3.5,
        resize_percent: 50,
        denoise: 1,
        upscale: Upscale::X2,
    }
}

fn load(path: &Path) -> Result<RasterBuffer> {
    let bytes = fs::read(path).with_context(|| format!("read failed for {}", path.display()))?;
    let decoded = RasterBuffer::decode(&bytes)
        .with_context(|| format!("decode failed for {}", path.display()))?;
    Ok(decoded.normalized())
}

fn main() -> Result<()> {
    let mut args = std::env::args();
    let _bin = args.next();
    let dir = args
        .next()
        .map(PathBuf::from)
        .context("usage: perf_probe <photo-dir> [count]")?;
    let count = args
        .next()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(20);

    let files = list_photos(&dir, count)?;
    if files.is_empty() {
        anyhow::bail!("No JPEG or PNG files found in {}", dir.display());
    }
    eprintln!("Using {} photos from {}", files.len(), dir.display());

    let mut decode_samples = Vec::with_capacity(files.len());
    let mut photos = Vec::with_capacity(files.len());
    for path in &files {
        let t0 = Instant::now();
        photos.push(load(path)?);
        decode_samples.push(t0.elapsed().as_secs_f64() * 1000.0);
    }

    let params = build_params();
    let mut chain_samples = Vec::with_capacity(photos.len());
    for photo in &photos {
        let t0 = Instant::now();
        let _out = processing::apply(photo, &params)?;
        chain_samples.push(t0.elapsed().as_secs_f64() * 1000.0);
    }

    let neutral = AdjustmentParams::default();
    let mut neutral_samples = Vec::with_capacity(photos.len());
    for photo in &photos {
        let t0 = Instant::now();
        let _out = processing::apply(photo, &neutral)?;
        neutral_samples.push(t0.elapsed().as_secs_f64() * 1000.0);
    }

    let out_dir = std::env::temp_dir().join(format!(
        "photo-converter-perf-probe-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    ));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("create_dir_all {}", out_dir.display()))?;

    let export_start = Instant::now();
    files
        .par_iter()
        .zip(photos.par_iter())
        .try_for_each(|(path, photo)| -> Result<()> {
            let processed = processing::apply(photo, &params)?;
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
            let output = out_dir.join(format!("{}.jpg", stem));
            let jpeg = processed
                .encode_jpeg(EXPORT_QUALITY)
                .with_context(|| format!("jpeg encode failed {}", output.display()))?;
            fs::write(&output, jpeg)
                .with_context(|| format!("write failed {}", output.display()))?;
            Ok(())
        })?;
    let export_wall_s = export_start.elapsed().as_secs_f64();
    let images_per_sec = files.len() as f64 / export_wall_s.max(1e-9);

    println!("METRIC file_count={}", files.len());
    println!("METRIC decode_ms_median={:.2}", median_ms(&decode_samples));
    println!("METRIC chain_ms_median={:.2}", median_ms(&chain_samples));
    println!("METRIC neutral_ms_median={:.2}", median_ms(&neutral_samples));
    println!("METRIC export_wall_s={:.2}", export_wall_s);
    println!("METRIC export_images_per_sec={:.3}", images_per_sec);
    println!("METRIC export_out_dir={}", out_dir.display());

    Ok(())
}
