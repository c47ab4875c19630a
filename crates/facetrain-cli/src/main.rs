use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use facetrain_core::{BoundingBox, Frame, PoolFile, Vision};
use facetrain_vision::detector::DEFAULT_CONFIDENCE_THRESHOLD;
use facetrain_vision::OnnxVision;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Parser)]
#[command(name = "facetrain", about = "facetrain offline tools")]
struct Cli {
    #[command(flatten)]
    models: ModelArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ModelArgs {
    /// Directory holding det_10g.onnx and w600k_r50.onnx
    #[arg(long, default_value = "models", global = true)]
    model_dir: PathBuf,

    /// Embedding dimension produced by the recognizer
    #[arg(long, default_value_t = 512, global = true)]
    dim: usize,

    /// Minimum detector score
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, global = true)]
    threshold: f32,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one image through detection, alignment, hashing and embedding
    Inspect {
        /// Image file to analyse
        image: PathBuf,
    },
    /// Build an unknown-pool file from a directory of face images
    Pool {
        /// Directory of images, one face each
        #[arg(long)]
        images: PathBuf,
        /// Output JSON file
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut vision = load_vision(&cli.models)?;

    match cli.command {
        Commands::Inspect { image } => inspect(&mut vision, &image),
        Commands::Pool { images, out } => build_pool(&mut vision, &images, &out, cli.models.dim),
    }
}

fn load_vision(args: &ModelArgs) -> Result<OnnxVision> {
    let vision = OnnxVision::load(
        &args.model_dir.join("det_10g.onnx"),
        &args.model_dir.join("w600k_r50.onnx"),
        args.threshold,
        args.dim,
    )
    .with_context(|| format!("loading models from {}", args.model_dir.display()))?;
    Ok(vision)
}

fn open_frame(path: &Path) -> Result<Frame> {
    let img = image::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Frame::from_image(&img))
}

fn inspect(vision: &mut OnnxVision, path: &Path) -> Result<()> {
    let frame = open_frame(path)?;
    let faces = vision.detect_faces(&frame)?;
    println!("{}: {}x{}, {} face(s)", path.display(), frame.width, frame.height, faces.len());

    for (i, face) in faces.iter().enumerate() {
        println!(
            "  [{i}] box=({:.0},{:.0} {:.0}x{:.0}) confidence={:.3}",
            face.x, face.y, face.width, face.height, face.confidence
        );
        let Some(aligned) = vision.align(&frame, face) else {
            println!("      not alignable");
            continue;
        };
        let fingerprint = vision.fingerprint(&aligned);
        match vision.embed(&aligned) {
            Ok(embedding) => {
                let norm = embedding.values().iter().map(|v| v * v).sum::<f32>().sqrt();
                println!("      fingerprint={fingerprint} dim={} norm={norm:.3}", embedding.dim());
            }
            Err(e) => println!("      fingerprint={fingerprint} embedding failed: {e}"),
        }
    }
    Ok(())
}

fn build_pool(vision: &mut OnnxVision, dir: &Path, out: &Path, dim: usize) -> Result<()> {
    let files = image_files(dir)?;
    if files.is_empty() {
        bail!("no images found in {}", dir.display());
    }

    let mut embeddings = Vec::with_capacity(files.len());
    for path in &files {
        match embed_best_face(vision, path) {
            Ok(Some(values)) => embeddings.push(values),
            Ok(None) => tracing::warn!(path = %path.display(), "no usable face; skipped"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipped"),
        }
    }

    let pool = PoolFile { dim, embeddings };
    let json = serde_json::to_string(&pool)?;
    std::fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
    println!(
        "wrote {} of {} image(s) to {}",
        pool.embeddings.len(),
        files.len(),
        out.display()
    );
    Ok(())
}

/// Embedding of the highest-confidence face in the image, if any can be aligned.
fn embed_best_face(vision: &mut OnnxVision, path: &Path) -> Result<Option<Vec<f32>>> {
    let frame = open_frame(path)?;
    let faces = vision.detect_faces(&frame)?;
    let Some(face) = best_face(&faces) else {
        return Ok(None);
    };
    let Some(aligned) = vision.align(&frame, face) else {
        return Ok(None);
    };
    Ok(Some(vision.embed(&aligned)?.values().to_vec()))
}

fn best_face(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    faces.iter().max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// Image files directly inside `dir`, sorted by path.
fn image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(confidence: f32) -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            confidence,
            landmarks: None,
        }
    }

    #[test]
    fn test_best_face_picks_highest_confidence() {
        let faces = [bbox(0.6), bbox(0.9), bbox(0.7)];
        assert_eq!(best_face(&faces).map(|f| f.confidence), Some(0.9));
        assert!(best_face(&[]).is_none());
    }

    #[test]
    fn test_image_files_filters_and_sorts() {
        let dir = std::env::temp_dir().join(format!("facetrain-cli-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        std::fs::create_dir_all(dir.join("sub.png")).unwrap();

        let files = image_files(&dir).unwrap();
        let names: Vec<_> = files.iter().filter_map(|p| p.file_name()?.to_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_cli_parses_pool_command() {
        let cli = Cli::try_parse_from(["facetrain", "pool", "--images", "faces", "--out", "pool.json", "--dim", "128"])
            .unwrap();
        assert_eq!(cli.models.dim, 128);
        assert!(matches!(cli.command, Commands::Pool { ref out, .. } if out == Path::new("pool.json")));
    }
}
