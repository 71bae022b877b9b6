// ============================================================================
// sketchpad CLI - headless document tooling via command-line arguments
// ============================================================================
//
// Usage examples:
//   sketchpad new 344 135 -o drawing.json --title "Sketch"
//   sketchpad info drawing.json "saved/*.json"
//   sketchpad render "saved/*.json" --output-dir flat/
//   sketchpad render drawing.json -o drawing.png --verbose
//
// Everything runs synchronously on the current thread. Document decoding is
// async and is driven to completion with pollster.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::canvas::{self, Document};
use crate::error::DocumentError;
use crate::io;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// sketchpad headless document tool.
#[derive(Parser, Debug)]
#[command(
    name = "sketchpad",
    about = "Create, inspect and flatten sketchpad documents",
    long_about = "Work with sketchpad JSON documents without an editor session.\n\n\
                  Example:\n  \
                  sketchpad new 800 600 -o blank.json\n  \
                  sketchpad render \"*.json\" --output-dir out/"
)]
pub struct CliArgs {
    /// Print per-file timing information.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a blank document (white background, one empty layer).
    New {
        width: i64,
        height: i64,
        /// Destination JSON file.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(short, long, default_value = "")]
        title: String,
    },
    /// Print a summary of each document.
    Info {
        /// Input file(s). Glob patterns accepted (e.g. "saved/*.json").
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
    },
    /// Flatten each document's visible layers to a PNG.
    Render {
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
        /// Output file path. Only valid for single-file input.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Output directory for batch rendering.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the parsed command and return an OS exit code.
/// `0` = everything succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    if execute(args) { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Returns `false` when any step or input failed.
pub fn execute(args: CliArgs) -> bool {
    match args.command {
        Command::New { width, height, output, title } => {
            match create_blank(width, height, &title, &output) {
                Ok(()) => {
                    if args.verbose {
                        println!("created {} ({}x{})", output.display(), width, height);
                    }
                    true
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    false
                }
            }
        }
        Command::Info { input } => for_each_input(&input, args.verbose, |path| {
            let doc = load_document(path)?;
            println!("{}", summarize(&doc));
            Ok(())
        }),
        Command::Render { input, output, output_dir } => {
            let inputs = resolve_inputs(&input);
            if inputs.len() > 1 && output.is_some() && output_dir.is_none() {
                eprintln!(
                    "error: {} input files given but --output only accepts a single file path.\n\
                     Use --output-dir to specify a destination directory for batch rendering.",
                    inputs.len()
                );
                return false;
            }
            if let Some(dir) = &output_dir
                && let Err(e) = std::fs::create_dir_all(dir)
            {
                eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
                return false;
            }
            for_each_input(&input, args.verbose, |path| {
                let target = build_output_path(path, output.as_deref(), output_dir.as_deref())
                    .ok_or_else(|| format!("cannot determine output path for '{}'", path.display()))?;
                let doc = load_document(path)?;
                io::save_png(&doc, &target).map_err(|e| format!("save failed: {}", e))?;
                println!("  -> {}", target.display());
                Ok(())
            })
        }
    }
}

// ============================================================================
// Per-file processing
// ============================================================================

fn for_each_input(
    patterns: &[String],
    verbose: bool,
    mut process: impl FnMut(&Path) -> Result<(), String>,
) -> bool {
    let inputs = resolve_inputs(patterns);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return false;
    }

    let total = inputs.len();
    let mut any_failure = false;
    for (idx, path) in inputs.iter().enumerate() {
        if total > 1 || verbose {
            println!("[{}/{}] {}", idx + 1, total, path.display());
        }
        let started = Instant::now();
        match process(path) {
            Ok(()) => {
                if verbose {
                    println!("  ({:.0}ms)", started.elapsed().as_secs_f64() * 1000.0);
                }
            }
            Err(e) => {
                eprintln!("  error: {}: {}", path.display(), e);
                tracing::warn!(path = %path.display(), error = %e, "cli file failed");
                any_failure = true;
            }
        }
    }

    !any_failure
}

fn create_blank(width: i64, height: i64, title: &str, output: &Path) -> Result<(), String> {
    canvas::validate_size(width, height).map_err(|e| e.to_string())?;
    let mut doc = Document::new(width as u32, height as u32).map_err(|e| e.to_string())?;
    doc.title = title.to_string();
    let json = io::serialize(&doc).map_err(|e| e.to_string())?;
    std::fs::write(output, json).map_err(|e| format!("write failed: {}", e))
}

fn load_document(path: &Path) -> Result<Document, String> {
    let data = std::fs::read_to_string(path).map_err(|e| format!("read failed: {}", e))?;
    pollster::block_on(io::deserialize(&data)).map_err(|e: DocumentError| format!("load failed: {}", e))
}

/// One-line description: title, size, layer count and the visible subset.
pub fn summarize(doc: &Document) -> String {
    let visible = doc.layers().iter().filter(|l| l.is_visible()).count();
    let title = if doc.title.is_empty() { "(untitled)" } else { doc.title.as_str() };
    format!(
        "{}: {}x{}, {} layer(s), {} visible, background {:?}",
        title,
        doc.width(),
        doc.height(),
        doc.layer_count(),
        visible,
        doc.background().to_rgba().0
    )
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Output path for a single input:
/// 1. `--output` when given
/// 2. `--output-dir/<stem>.png`
/// 3. `<input dir>/<stem>.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }
    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let file = format!("{}.png", stem);
    match output_dir {
        Some(dir) => Some(dir.join(file)),
        None => Some(input.with_file_name(file)),
    }
}
