//! `oaimirror`: mirror the assets of an exported transcript and rewrite it for offline use.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use oaistatic_mirror::rewrite::CleanLevel;
use oaistatic_mirror::{
  DocumentInput, DocumentOutput, HttpFetcher, MirrorConfig, MirrorPipeline, RunOptions,
};

/// Mirror the scripts, stylesheets and media of an exported chat transcript.
#[derive(Parser, Debug)]
#[command(name = "oaimirror", version, about, long_about = None)]
struct Cli {
  /// Document to process, or `-` to read standard input.
  input: PathBuf,

  /// Base directory holding the asset store, documents and logs.
  #[arg(short, long, default_value = ".")]
  repo: PathBuf,

  /// Directory holding locally exported assets, instead of the sibling `<name>_fichiers`.
  #[arg(short, long)]
  source_dir: Option<PathBuf>,

  /// Path of the rewritten document.
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Logical document name, required when reading standard input.
  #[arg(long)]
  name: Option<String>,

  /// Print the rewritten document on standard output.
  #[arg(long)]
  stdout: bool,

  /// Replace an existing output document with different content.
  #[arg(short, long)]
  force: bool,

  /// Continue without asking when the source directory is missing.
  #[arg(short, long)]
  yes: bool,

  /// Only report errors.
  #[arg(short = 'q', long)]
  silent: bool,

  /// Report every reference.
  #[arg(short, long, conflicts_with = "silent")]
  verbose: bool,

  /// Do not write a provenance log.
  #[arg(long)]
  no_log: bool,

  /// Never fetch remote assets.
  #[arg(long)]
  offline: bool,

  /// Replace mirrored stylesheet links with inline `<style>` elements.
  #[arg(long)]
  inline_styles: bool,

  /// Remove comments and the generator `<meta>` tag from the rewritten document.
  #[arg(long)]
  clean: bool,

  /// Also remove inline `style` attributes. Implies `--clean`.
  #[arg(long)]
  strip_style: bool,

  /// Also remove `data-*` and `on*` attributes. Implies `--strip-style`.
  #[arg(long)]
  aggressive: bool,

  /// Configuration file, instead of `mirror.config.json` in the base directory.
  #[arg(long)]
  config: Option<PathBuf>,
}

impl Cli {
  fn run_options(&self) -> RunOptions {
    RunOptions {
      force_overwrite: self.force,
      skip_prompts: self.yes,
      silent: self.silent,
      verbose: self.verbose,
      write_log: !self.no_log,
      output_to_stdout: self.stdout,
      allow_fetch: !self.offline,
      inline_styles: self.inline_styles,
      clean: self.clean_level(),
    }
  }

  fn clean_level(&self) -> CleanLevel {
    if self.aggressive {
      CleanLevel::Aggressive
    } else if self.strip_style {
      CleanLevel::StripStyle
    } else if self.clean {
      CleanLevel::Basic
    } else {
      CleanLevel::Off
    }
  }

  fn document(&self) -> Result<DocumentInput> {
    if self.input.as_os_str() == "-" {
      let mut text = String::new();
      io::stdin()
        .read_to_string(&mut text)
        .context("failed to read standard input")?;
      let name = self.name.clone().unwrap_or_else(|| "stdin.html".to_string());
      return Ok(DocumentInput::from_text(name, text));
    }

    let mut document = DocumentInput::from_path(&self.input)?;
    if let Some(name) = &self.name {
      document.name = name.clone();
    }
    Ok(document)
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.silent {
    "error"
  } else if cli.verbose {
    "debug"
  } else {
    "info"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(io::stderr)
    .init();

  match run(&cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      tracing::error!("{err:#}");
      ExitCode::from(1)
    }
  }
}

fn run(cli: &Cli) -> Result<()> {
  let config = match &cli.config {
    Some(path) => MirrorConfig::load(path)?,
    None => MirrorConfig::discover(&cli.repo),
  };
  let options = cli.run_options();
  let document = cli.document()?;

  let fetcher = if options.allow_fetch {
    Some(HttpFetcher::new(&config)?)
  } else {
    None
  };

  let mut pipeline = MirrorPipeline::new(&config, &options, &cli.repo);
  if let Some(fetcher) = &fetcher {
    pipeline = pipeline.with_fetcher(fetcher);
  }
  if let Some(dir) = &cli.source_dir {
    pipeline = pipeline.with_source_dir(dir);
  }
  if let Some(path) = &cli.output {
    pipeline = pipeline.with_output_path(path);
  }

  let report = pipeline.run(&document)?;

  if report.output == DocumentOutput::Stdout {
    let mut stdout = io::stdout().lock();
    stdout
      .write_all(report.document.as_bytes())
      .and_then(|_| stdout.flush())
      .context("failed to write standard output")?;
  }

  if !options.silent {
    match &report.output {
      DocumentOutput::Written(path) => eprintln!("{} -> {}", document.name, path.display()),
      DocumentOutput::Unchanged(path) => eprintln!("{} unchanged at {}", document.name, path.display()),
      DocumentOutput::Stdout => {}
    }
    eprintln!("{}", report.summary);
    if let Some(log) = &report.log_path {
      eprintln!("provenance log: {}", log.display());
    }
  }
  Ok(())
}
