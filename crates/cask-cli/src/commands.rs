use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use cask_catalog::open_journaled;
use cask_engine::{DeduplicationEngine, IngestOutcome, IngestResult, StatsReport, DEFAULT_MEDIA_TYPE};
use cask_store::FsBlobStore;
use cask_types::Digest;

use crate::cli::*;
use crate::config::{CaskConfig, Layout};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    if let Command::Init = cli.command {
        return cmd_init(&cli.root);
    }

    let engine = open_engine(&cli.root)?;
    match cli.command {
        Command::Init => Ok(()),
        Command::Add(args) => cmd_add(&engine, args, format),
        Command::Stats => cmd_stats(&engine, format),
        Command::Ls => cmd_ls(&engine, format),
        Command::Refs(arg) => cmd_refs(&engine, &arg.digest, format),
        Command::Types => cmd_types(&engine, format),
        Command::Cat(arg) => cmd_cat(&engine, &arg.digest),
        Command::Rm(arg) => cmd_rm(&engine, &arg.digest, format),
        Command::Gc => cmd_gc(&engine, format),
    }
}

/// Open the engine over the store at `root`.
pub fn open_engine(root: &Path) -> anyhow::Result<DeduplicationEngine> {
    let layout = Layout::new(root);
    if !layout.config_path().is_file() {
        bail!(
            "no store at {} (run `cask init` first)",
            layout.root().display()
        );
    }
    let config = CaskConfig::load(root)?;
    debug!(root = %root.display(), fsync = config.storage.fsync, "opening store");

    let blobs = FsBlobStore::open(layout.objects_dir())?.with_fsync(config.storage.fsync);
    let (catalog, ledger) = open_journaled(&layout.journal_path(), config.sync_mode())
        .with_context(|| format!("cannot open catalog in {}", root.display()))?;

    Ok(DeduplicationEngine::new(
        Arc::new(blobs),
        Arc::new(catalog),
        Arc::new(ledger),
        config.engine,
    ))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(root: &Path) -> anyhow::Result<()> {
    let layout = Layout::new(root);
    if layout.config_path().is_file() {
        println!("Store already initialized in {}", root.display().to_string().bold());
        return Ok(());
    }
    fs::create_dir_all(layout.objects_dir())
        .with_context(|| format!("cannot create {}", root.display()))?;
    CaskConfig::default().save(root)?;
    println!("{} Initialized Cask store in {}", "✓".green().bold(), root.display().to_string().bold());
    Ok(())
}

// ---- add ----

/// Expand the given paths into the list of files to ingest.
fn collect_files(paths: &[PathBuf], recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        let meta = fs::metadata(path).with_context(|| format!("cannot read {}", path.display()))?;
        if meta.is_file() {
            files.push(path.clone());
        } else if meta.is_dir() {
            if !recursive {
                bail!("{} is a directory (use -r to add it)", path.display());
            }
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        }
    }
    Ok(files)
}

/// Media type from the file extension.
fn guess_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string())
}

fn ingest_file(
    engine: &DeduplicationEngine,
    path: &Path,
    declared_type: Option<&str>,
) -> anyhow::Result<IngestResult> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let declared_type = declared_type
        .map(str::to_string)
        .unwrap_or_else(|| guess_type(path));

    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
    );
    debug!(path = %path.display(), declared_type = %declared_type, "adding file");
    engine
        .ingest(&mut reader, &filename, &declared_type)
        .with_context(|| format!("failed to add {}", path.display()))
}

fn cmd_add(engine: &DeduplicationEngine, args: AddArgs, format: OutputFormat) -> anyhow::Result<()> {
    let files = collect_files(&args.paths, args.recursive)?;
    debug!(files = files.len(), recursive = args.recursive, "collected files to add");
    let mut results = Vec::with_capacity(files.len());
    for path in &files {
        let result = ingest_file(engine, path, args.declared_type.as_deref())?;
        if format == OutputFormat::Text {
            print_ingest(path, &result);
        }
        results.push(result);
    }

    match format {
        OutputFormat::Json => print_json(&results),
        OutputFormat::Text => {
            let duplicates = results.iter().filter(|r| r.is_duplicate).count();
            let saved: u64 = results.iter().map(|r| r.bytes_saved_by_this_upload).sum();
            println!(
                "\n{} file(s) added, {} duplicate(s), {} saved",
                results.len().to_string().bold(),
                duplicates.to_string().yellow(),
                format_bytes(saved).green()
            );
            Ok(())
        }
    }
}

fn print_ingest(path: &Path, result: &IngestResult) {
    let short = result.object.digest.short_hex();
    match &result.outcome {
        IngestOutcome::NewObject { .. } => println!(
            "  {} {} {} ({})",
            "stored".green(),
            short.yellow(),
            path.display(),
            format_bytes(result.object.size)
        ),
        IngestOutcome::DuplicateReference { .. } => println!(
            "  {} {} {} -> {} (saved {})",
            "linked".cyan(),
            short.yellow(),
            path.display(),
            result.object.first_filename.bold(),
            format_bytes(result.bytes_saved_by_this_upload)
        ),
    }
}

// ---- queries ----

fn cmd_stats(engine: &DeduplicationEngine, format: OutputFormat) -> anyhow::Result<()> {
    let report = engine.stats_report()?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print_stats(&report);
            Ok(())
        }
    }
}

fn print_stats(report: &StatsReport) {
    println!("{}", "Storage statistics".bold());
    println!("  Uploads:         {}", report.total_uploads);
    println!("  Unique objects:  {}", report.unique_objects);
    println!(
        "  Logical size:    {} ({:.2} MiB)",
        format_bytes(report.logical_bytes),
        report.logical_mb
    );
    println!(
        "  Physical size:   {} ({:.2} MiB)",
        format_bytes(report.physical_bytes),
        report.physical_mb
    );
    println!(
        "  Saved:           {} ({:.2}%)",
        format_bytes(report.bytes_saved).green(),
        report.saved_percentage
    );
}

fn cmd_ls(engine: &DeduplicationEngine, format: OutputFormat) -> anyhow::Result<()> {
    let objects = engine.list_objects()?;
    if format == OutputFormat::Json {
        return print_json(&objects);
    }
    if objects.is_empty() {
        println!("No objects stored.");
        return Ok(());
    }
    for view in &objects {
        let uploads = format!("{}x", view.reference_count);
        println!(
            "{}  {:>10}  {:>4}  {:<24}  {}",
            view.object.digest.short_hex().yellow(),
            format_bytes(view.object.size),
            if view.is_duplicate { uploads.cyan() } else { uploads.normal() },
            view.object.declared_type,
            view.object.first_filename
        );
    }
    Ok(())
}

fn cmd_refs(engine: &DeduplicationEngine, digest: &Digest, format: OutputFormat) -> anyhow::Result<()> {
    let listing = engine.list_references(digest)?;
    if format == OutputFormat::Json {
        return print_json(&listing);
    }
    let original = &listing.original.object;
    println!(
        "{} {} ({}, {})",
        original.digest.to_string().yellow(),
        original.first_filename.bold(),
        format_bytes(original.size),
        original.declared_type
    );
    println!("  first stored {}", original.created_at.to_rfc3339().dimmed());
    if listing.references.is_empty() {
        println!("  no duplicate uploads");
    }
    for reference in &listing.references {
        println!(
            "  {} {} {}",
            reference.id.short_id().dimmed(),
            reference.created_at.to_rfc3339(),
            reference.filename
        );
    }
    println!("  {} reference(s)", listing.total_references);
    Ok(())
}

fn cmd_types(engine: &DeduplicationEngine, format: OutputFormat) -> anyhow::Result<()> {
    let types = engine.declared_types()?;
    match format {
        OutputFormat::Json => print_json(&types),
        OutputFormat::Text => {
            for declared in &types {
                println!("{declared}");
            }
            Ok(())
        }
    }
}

fn cmd_cat(engine: &DeduplicationEngine, digest: &Digest) -> anyhow::Result<()> {
    let mut reader = engine.open_blob(digest)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut reader, &mut out)?;
    out.flush()?;
    Ok(())
}

// ---- maintenance ----

fn cmd_rm(engine: &DeduplicationEngine, digest: &Digest, format: OutputFormat) -> anyhow::Result<()> {
    let report = engine.remove_object(digest)?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!(
                "{} Removed {} ({}) and {} reference(s)",
                "✓".green(),
                report.object.first_filename.bold(),
                report.object.digest.short_hex().yellow(),
                report.references_removed
            );
            Ok(())
        }
    }
}

fn cmd_gc(engine: &DeduplicationEngine, format: OutputFormat) -> anyhow::Result<()> {
    let report = engine.collect_garbage()?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!(
                "{} GC: {} of {} blob(s) removed.",
                "✓".green(),
                report.removed.len(),
                report.scanned
            );
            Ok(())
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Read;

    fn init_store() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(".cask");
        cmd_init(&root).unwrap();
        (dir, root)
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn type_guessing() {
        assert_eq!(guess_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_type(Path::new("photo.png")), "image/png");
        assert_eq!(guess_type(Path::new("README")), DEFAULT_MEDIA_TYPE);
    }

    #[test]
    fn engine_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_engine(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn init_is_idempotent() {
        let (_dir, root) = init_store();
        cmd_init(&root).unwrap();
        assert!(Layout::new(&root).config_path().is_file());
    }

    #[test]
    fn directories_need_recursive_flag() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        fs::create_dir_all(docs.join("nested")).unwrap();
        fs::write(docs.join("a.txt"), b"a").unwrap();
        fs::write(docs.join("nested").join("b.txt"), b"b").unwrap();

        assert!(collect_files(&[docs.clone()], false).is_err());
        let files = collect_files(&[docs.clone()], true).unwrap();
        assert_eq!(files, vec![docs.join("a.txt"), docs.join("nested").join("b.txt")]);
    }

    #[test]
    fn add_files_and_reopen() {
        let (dir, root) = init_store();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"hello").unwrap();
        fs::write(&b, b"hello").unwrap();

        {
            let engine = open_engine(&root).unwrap();
            let first = ingest_file(&engine, &a, None).unwrap();
            assert_eq!(first.object.declared_type, "text/plain");
            let second = ingest_file(&engine, &b, Some("application/x-custom")).unwrap();
            assert!(second.is_duplicate);
        }

        let engine = open_engine(&root).unwrap();
        let report = engine.stats_report().unwrap();
        assert_eq!(report.total_uploads, 2);
        assert_eq!(report.bytes_saved, 5);
        assert_eq!(report.saved_percentage, 50.0);

        let digest = Digest::of(b"hello");
        let mut data = Vec::new();
        engine.open_blob(&digest).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"hello");
    }

    #[test]
    fn run_command_end_to_end() {
        let (dir, root) = init_store();
        let file = dir.path().join("data.bin");
        fs::write(&file, b"payload").unwrap();
        let root_arg = root.display().to_string();
        let file_arg = file.display().to_string();

        let run = |args: &[&str]| {
            let mut argv = vec!["cask", "--root", root_arg.as_str()];
            argv.extend_from_slice(args);
            run_command(Cli::try_parse_from(argv).unwrap())
        };

        run(&["add", file_arg.as_str()]).unwrap();
        run(&["stats", "--format", "json"]).unwrap();
        run(&["ls"]).unwrap();
        let hex = Digest::of(b"payload").to_hex();
        run(&["refs", hex.as_str()]).unwrap();
        run(&["rm", hex.as_str()]).unwrap();
        assert!(run(&["refs", hex.as_str()]).is_err());
        run(&["gc"]).unwrap();
    }
}
