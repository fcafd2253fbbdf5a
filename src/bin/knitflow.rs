use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use knitflow::{
    InstructionStore, IssueKind, Pipeline, PipelineParams, Scene, TextOptions, join_parts,
    parse_text, write_text,
};

#[derive(Parser, Debug)]
#[command(name = "knitflow", version)]
struct Cli {
    /// Log pipeline progress to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a scene JSON document to knitout.
    Compile(CompileArgs),
    /// Convert the paths of an SVG document into sketches.
    ImportSvg(ImportArgs),
    /// Parse a knitout file and check that it re-emits unchanged.
    Check(CheckArgs),
    /// Join knitout files into one, part by part.
    Join(JoinArgs),
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Pipeline parameters JSON.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Output knitout path. With several parts and no `--joint`, parts are written next to it
    /// as `<stem>-<i>.k`.
    #[arg(long)]
    out: PathBuf,

    /// Write every part into a single file.
    #[arg(long)]
    joint: bool,
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// Input SVG.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output scene JSON.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Knitout file.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct JoinArgs {
    /// Knitout files, in order.
    #[arg(long = "in", required = true)]
    inputs: Vec<PathBuf>,

    /// Output knitout path.
    #[arg(long)]
    out: PathBuf,
}

const KEEP: TextOptions = TextOptions { keep_empty: true };

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Compile(args) => cmd_compile(args, cli.verbose),
        Command::ImportSvg(args) => cmd_import_svg(args),
        Command::Check(args) => cmd_check(args),
        Command::Join(args) => cmd_join(args),
    }
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("write '{}'", path.display()))
}

fn read_knitout(path: &Path) -> anyhow::Result<InstructionStore> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("read knitout '{}'", path.display()))?;
    parse_text(&src, KEEP).with_context(|| format!("parse knitout '{}'", path.display()))
}

fn part_path(out: &Path, index: usize) -> PathBuf {
    let stem = out
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "part".to_string());
    out.with_file_name(format!("{stem}-{index}.k"))
}

fn cmd_compile(args: CompileArgs, verbose: bool) -> anyhow::Result<()> {
    let scene = Scene::from_path(&args.in_path)?;
    let mut params = match &args.params {
        Some(p) => PipelineParams::from_path(p)?,
        None => PipelineParams::default(),
    };
    params.verbose |= verbose;

    let assets_root = args.in_path.parent().unwrap_or_else(|| Path::new("."));
    let mut pipeline = Pipeline::new(params).with_assets_root(assets_root);
    pipeline.run_blocking(&scene)?;

    let artifacts = pipeline.artifacts();
    for issue in artifacts.issues() {
        let kind = match issue.kind {
            IssueKind::Error => "error",
            IssueKind::Warning => "warning",
        };
        eprintln!("{kind}: {}", issue.message);
    }
    let parts = &artifacts.knitouts;
    if parts.is_empty() {
        anyhow::bail!("nothing to knit in '{}'", args.in_path.display());
    }
    for (i, part) in parts.iter().enumerate() {
        let trace = &artifacts.traces[i].stats;
        eprintln!(
            "part {}: {} passes, {} courses, {} instructions ({} xfers, {} racks)",
            i + 1,
            trace.passes,
            trace.courses,
            part.stats.instructions,
            part.stats.xfers,
            part.stats.racks
        );
    }

    if parts.len() == 1 || args.joint {
        let text = if parts.len() == 1 {
            parts[0].to_text()
        } else {
            write_text(&join_parts(parts)?, TextOptions::default())
        };
        write_file(&args.out, &text)?;
        eprintln!("wrote {}", args.out.display());
    } else {
        for (i, part) in parts.iter().enumerate() {
            let path = part_path(&args.out, i + 1);
            write_file(&path, &part.to_text())?;
            eprintln!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn cmd_import_svg(args: ImportArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read svg '{}'", args.in_path.display()))?;
    let mut scene = Scene::new();
    let sketches = knitflow::import_svg(&mut scene, &bytes)?;
    write_file(&args.out, &scene.to_json()?)?;
    eprintln!("imported {} sketches into {}", sketches.len(), args.out.display());
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let src = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read knitout '{}'", args.in_path.display()))?;
    let store = parse_text(&src, KEEP)
        .with_context(|| format!("parse knitout '{}'", args.in_path.display()))?;
    let out = write_text(&store, KEEP);
    eprintln!("{} instructions", store.len());
    if out != src {
        anyhow::bail!("'{}' does not re-emit identically", args.in_path.display());
    }
    Ok(())
}

fn cmd_join(args: JoinArgs) -> anyhow::Result<()> {
    let stores = args
        .inputs
        .iter()
        .map(|p| read_knitout(p))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let joint = InstructionStore::join(&stores)?;
    write_file(&args.out, &write_text(&joint, KEEP))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
