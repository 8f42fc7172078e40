use clap::{Parser, Subcommand};
use qr_image_parse::tools::{BatchTally, dataset_iter, plane_stats};
use qr_image_parse::{
    DecodeCoordinator, DecodeHandle, DecodePool, FileImageLoader, ImageLoader, ScanConfig,
    ScanError, convert, convert_parallel,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qrtool", version, about = "Still-image barcode decoding tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a single image
    Scan {
        #[arg(long)]
        image: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert an image to raw NV21 bytes
    Convert {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Decode every image under a directory through the worker pool
    Batch {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = ScanConfig::from_env();

    match cli.command {
        Command::Scan { image, json } => scan_cmd(&config, &image, json),
        Command::Convert { image, out } => convert_cmd(&config, &image, &out),
        Command::Batch { root, limit } => batch_cmd(config, &root, limit),
    }
}

fn scan_cmd(config: &ScanConfig, image: &Path, json: bool) -> ExitCode {
    let start = Instant::now();
    let result = DecodeCoordinator::new(config).submit(image).wait().into_result();
    let elapsed = start.elapsed();

    let ok = result.is_ok();
    if json {
        let rendered = match &result {
            Ok(code) => serde_json::to_string_pretty(code),
            Err(err) => serde_json::to_string_pretty(err),
        };
        match rendered {
            Ok(text) => println!("{}", text),
            Err(err) => {
                eprintln!("Failed to serialize result: {}", err);
                return ExitCode::FAILURE;
            }
        }
    } else {
        match &result {
            Ok(code) => println!("{} [{}] ({:.2?})", code.code, code.kind, elapsed),
            Err(err) => println!("{}: {} ({:.2?})", image.display(), err, elapsed),
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn convert_cmd(config: &ScanConfig, image: &Path, out: &Path) -> ExitCode {
    let loader = FileImageLoader::new(config.max_pixels, config.max_dimension);
    let converted = loader.load(image).and_then(|pixels| {
        if config.parallel_convert {
            convert_parallel(pixels)
        } else {
            convert(pixels)
        }
    });
    let buffer = match converted {
        Ok(buffer) => buffer,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let stats = plane_stats(&buffer);
    println!(
        "{}: {}x{} -> {} bytes (luma {}-{}, avg {}; chroma avg {})",
        image.display(),
        buffer.width(),
        buffer.height(),
        buffer.bytes().len(),
        stats.luma_min,
        stats.luma_max,
        stats.luma_avg,
        stats.chroma_avg
    );

    if let Err(err) = std::fs::write(out, buffer.bytes()) {
        eprintln!("Failed to write {}: {}", out.display(), err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn batch_cmd(config: ScanConfig, root: &Path, limit: Option<usize>) -> ExitCode {
    if !root.exists() {
        eprintln!("Dataset root not found: {}", root.display());
        return ExitCode::FAILURE;
    }
    let images: Vec<PathBuf> = dataset_iter(root, limit).collect();
    if images.is_empty() {
        println!("No images found under {}", root.display());
        return ExitCode::SUCCESS;
    }

    let pool = match DecodePool::new(config) {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let mut tally = BatchTally::default();
    let mut pending: VecDeque<(PathBuf, DecodeHandle)> = VecDeque::new();

    for path in images {
        loop {
            match pool.submit(&path) {
                Ok(handle) => {
                    pending.push_back((path, handle));
                    break;
                }
                Err(ScanError::QueueFull { .. }) => match pending.pop_front() {
                    Some((done, handle)) => report(&mut tally, &done, handle),
                    None => std::thread::yield_now(),
                },
                Err(err) => {
                    eprintln!("{}: {}", path.display(), err);
                    tally.record(Some(err.failure_reason()));
                    break;
                }
            }
        }
    }
    while let Some((done, handle)) = pending.pop_front() {
        report(&mut tally, &done, handle);
    }

    println!(
        "Decoded {}/{} = {:.2}% (not found {}, errors {}, skipped {}) in {:.2?}",
        tally.decoded,
        tally.total(),
        tally.reading_rate(),
        tally.not_found,
        tally.errors,
        tally.skipped,
        start.elapsed()
    );
    ExitCode::SUCCESS
}

fn report(tally: &mut BatchTally, path: &Path, handle: DecodeHandle) {
    let outcome = handle.wait();
    tally.record(outcome.failure_reason());
    match outcome.into_result() {
        Ok(code) => println!("  {} -> {}", path.display(), code.code),
        Err(err) => println!("  {} -> {:?}", path.display(), err.reason),
    }
}
