use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bpetok::{BpeModel, Encoder, ModelConfig, StreamingEncoder, TokenId};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde_json::json;
use walkdir::WalkDir;

const DEFAULT_ASSET_DIR: &str = "assets/gpt2";

const ASSET_FILES: [(&str, &str); 2] = [
    (
        "vocab.json",
        "https://huggingface.co/openai-community/gpt2/resolve/main/vocab.json",
    ),
    (
        "merges.txt",
        "https://huggingface.co/openai-community/gpt2/resolve/main/merges.txt",
    ),
];

#[derive(Parser, Debug)]
#[command(author, version, about = "GPT-2 byte-level BPE toolkit", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the GPT-2 vocab.json and merges.txt assets
    Fetch(FetchArgs),
    /// Encode files into token ids
    Encode(EncodeArgs),
    /// Decode token ids back into bytes
    Decode(DecodeArgs),
    /// Inspect a loaded model
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Path to vocab.json
    #[arg(long, value_name = "PATH", default_value = "assets/gpt2/vocab.json")]
    vocab: PathBuf,

    /// Path to merges.txt
    #[arg(long, value_name = "PATH", default_value = "assets/gpt2/merges.txt")]
    merges: PathBuf,

    /// Override the dense pair-lookup cutoff
    #[arg(long, value_name = "SIZE")]
    fast_lookup_size: Option<usize>,
}

impl ModelArgs {
    fn load(&self) -> Result<BpeModel> {
        let mut builder = ModelConfig::builder();
        if let Some(size) = self.fast_lookup_size {
            builder = builder.fast_lookup_size(size);
        }
        let config = builder.build()?;
        let model = BpeModel::from_files(&self.vocab, &self.merges, config)
            .context("failed to load model")?;
        Ok(model)
    }
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Directory to place the downloaded assets in
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_ASSET_DIR)]
    output_dir: PathBuf,

    /// Re-download files that already exist
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Files or directories to encode
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Route bytes through the streaming encoder in chunks of this size
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Emit JSON lines instead of human-readable output
    #[arg(long)]
    json: bool,

    /// Optional directory to write .tokens files
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Limit Rayon worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Disable recursive directory traversal
    #[arg(long)]
    no_recursive: bool,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Path to whitespace separated token ids
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Token ids to decode when --input is omitted
    #[arg(value_name = "ID", required_unless_present = "input")]
    tokens: Vec<TokenId>,

    /// Output file for decoded bytes (defaults to stdout)
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Emit machine-readable JSON summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Fetch(args) => run_fetch(&args),
        Commands::Encode(args) => run_encode(args),
        Commands::Decode(args) => run_decode(&args),
        Commands::Info(args) => run_info(&args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn run_fetch(args: &FetchArgs) -> Result<()> {
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {:?}", args.output_dir))?;

    for (name, url) in ASSET_FILES {
        let dest = args.output_dir.join(name);
        if dest.exists() && !args.force {
            info!("{dest:?} already exists, skipping (use --force to re-download)");
            continue;
        }
        download(url, &dest).with_context(|| format!("failed to download {name}"))?;
        info!("downloaded {name} to {dest:?}");
    }
    Ok(())
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?;

    let bar = match response.content_length() {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} {msg}")
            .context("progress template")?,
    );

    let mut reader = bar.wrap_read(response);
    let mut out = File::create(dest).with_context(|| format!("create {dest:?}"))?;
    let written = io::copy(&mut reader, &mut out).with_context(|| format!("write {dest:?}"))?;
    bar.finish_and_clear();

    if written == 0 {
        bail!("download of {url} produced 0 bytes");
    }
    Ok(())
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
    }
    if args.chunk_size == Some(0) {
        bail!("--chunk-size must be greater than zero");
    }

    let files = collect_input_paths(&args.inputs, !args.no_recursive)?;
    let model = Arc::new(args.model.load()?);

    let mut results: Vec<(PathBuf, Vec<TokenId>)> = files
        .par_iter()
        .map_init(
            || EncoderKind::new(Arc::clone(&model), args.chunk_size),
            |encoder, path| {
                let data =
                    fs::read(path).with_context(|| format!("failed to read {path:?}"))?;
                Ok((path.clone(), encoder.encode(&data)))
            },
        )
        .collect::<Result<_>>()?;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;
    }

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    for (path, tokens) in &results {
        if args.json {
            let line = json!({
                "path": path,
                "count": tokens.len(),
                "tokens": tokens,
            });
            writeln!(stdout, "{line}")?;
        } else {
            writeln!(stdout, "{}: {} tokens", path.display(), tokens.len())?;
        }

        if let Some(dir) = &args.output_dir {
            let name = path
                .file_name()
                .map(|n| format!("{}.tokens", n.to_string_lossy()))
                .unwrap_or_else(|| "output.tokens".into());
            let rendered = tokens
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            fs::write(dir.join(&name), rendered)
                .with_context(|| format!("failed to write {name}"))?;
        }
    }
    Ok(())
}

/// Offline or streaming encoder, picked once per worker thread.
enum EncoderKind {
    Offline(Encoder),
    Streaming(StreamingEncoder, usize),
}

impl EncoderKind {
    fn new(model: Arc<BpeModel>, chunk_size: Option<usize>) -> Self {
        match chunk_size {
            None => Self::Offline(Encoder::new(model)),
            Some(size) => Self::Streaming(StreamingEncoder::new(model), size),
        }
    }

    fn encode(&mut self, data: &[u8]) -> Vec<TokenId> {
        match self {
            Self::Offline(encoder) => encoder.encode(data),
            Self::Streaming(encoder, chunk_size) => {
                let mut out = Vec::new();
                for chunk in data.chunks(*chunk_size) {
                    out.extend_from_slice(encoder.push(chunk));
                }
                out.extend_from_slice(encoder.flush());
                out
            }
        }
    }
}

fn run_decode(args: &DecodeArgs) -> Result<()> {
    let model = args.model.load()?;

    let ids: Vec<TokenId> = match &args.input {
        Some(path) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
            text.split_whitespace()
                .map(|field| {
                    field
                        .parse::<TokenId>()
                        .with_context(|| format!("invalid token id {field:?}"))
                })
                .collect::<Result<_>>()?
        }
        None => args.tokens.clone(),
    };

    if let Some(&bad) = ids.iter().find(|&&id| id as usize >= model.vocab_size()) {
        bail!(
            "token id {bad} is out of range for a vocabulary of {}",
            model.vocab_size()
        );
    }
    let bytes = model.decode(&ids);

    match &args.output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("failed to write {path:?}"))?;
        }
        None => {
            io::stdout().write_all(&bytes)?;
        }
    }
    Ok(())
}

fn run_info(args: &InfoArgs) -> Result<()> {
    let model = args.model.load()?;

    if args.json {
        let summary = json!({
            "vocab_size": model.vocab_size(),
            "merge_count": model.merge_count(),
            "max_token_byte_len": model.max_token_byte_len(),
            "fast_lookup_size": model.model_config().fast_lookup_size,
        });
        println!("{summary}");
    } else {
        println!("vocab size:         {}", model.vocab_size());
        println!("merge rules:        {}", model.merge_count());
        println!("longest token:      {} bytes", model.max_token_byte_len());
        println!(
            "fast lookup cutoff: {}",
            model.model_config().fast_lookup_size
        );
    }
    Ok(())
}

/// Expands the provided paths into a flat, deduplicated file list.
fn collect_input_paths(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.exists() {
            bail!("input path {input:?} does not exist");
        }
        if input.is_dir() {
            if recursive {
                for entry in WalkDir::new(input) {
                    let entry = entry.context("directory traversal failed")?;
                    if entry.file_type().is_file() {
                        files.push(entry.path().to_path_buf());
                    }
                }
            } else {
                for entry in
                    fs::read_dir(input).with_context(|| format!("failed to read {input:?}"))?
                {
                    let path = entry?.path();
                    if path.is_file() {
                        files.push(path);
                    }
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    if files.is_empty() {
        bail!("no files discovered in provided inputs");
    }
    Ok(files)
}
