//! PDF annotator command line
//!
//! Inspects a PDF's form fields, or applies an annotation JSON (as saved by
//! the browser annotator) to a PDF and writes the annotated copy.

use anyhow::{bail, Context};
use annotator_core::{AnnotatorConfig, AnnotatorSession};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdf-annotate")]
#[command(version, about = "Annotate PDFs with boxes, text and form values")]
struct Args {
    /// TOML configuration file; omitted keys keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print page count and form fields as JSON
    Inspect {
        /// PDF to inspect
        pdf: PathBuf,
    },
    /// Bake an annotation JSON into a copy of the PDF
    Export {
        /// Source PDF
        pdf: PathBuf,

        /// Annotation JSON (boxes, textAnnotations, formValues)
        #[arg(short, long)]
        annotations: PathBuf,

        /// Output directory, defaults to the PDF's directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout carries JSON, so logs go to stderr
    tracing_subscriber::registry()
        .with(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AnnotatorConfig::default(),
    };

    match args.command {
        Command::Inspect { pdf } => {
            let report = inspect(&pdf, config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Export {
            pdf,
            annotations,
            out_dir,
        } => {
            let written = export(&pdf, &annotations, out_dir.as_deref(), config)?;
            println!("{}", written.display());
        }
    }

    Ok(())
}

/// `RUST_LOG` when set and valid, otherwise `info`
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Load and validate a TOML configuration file
fn load_config(path: &Path) -> anyhow::Result<AnnotatorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

fn parse_config(content: &str) -> anyhow::Result<AnnotatorConfig> {
    let config: AnnotatorConfig = toml::from_str(content).context("Failed to parse TOML")?;
    config.validate()?;
    Ok(config)
}

fn read_pdf(pdf: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(pdf).with_context(|| format!("Failed to read PDF: {}", pdf.display()))
}

fn open_session(
    pdf: &Path,
    bytes: Vec<u8>,
    config: AnnotatorConfig,
) -> anyhow::Result<AnnotatorSession> {
    let name = pdf
        .file_name()
        .and_then(|n| n.to_str())
        .context("PDF path has no usable file name")?
        .to_string();

    let mime = config.accepted_mime.clone();
    let mut session = AnnotatorSession::new(config);
    session
        .open(&name, &mime, bytes)
        .with_context(|| format!("Cannot open {}", pdf.display()))?;
    Ok(session)
}

fn inspect(pdf: &Path, config: AnnotatorConfig) -> anyhow::Result<serde_json::Value> {
    let bytes = read_pdf(pdf)?;
    let page_sizes = annotator_core::get_page_sizes(&bytes).unwrap_or_default();
    let session = open_session(pdf, bytes, config)?;
    let Some(forms) = session.introspection() else {
        bail!("No document loaded");
    };
    Ok(serde_json::json!({
        "pages": session.page_count(),
        "pageSizes": page_sizes,
        "hasFormFields": forms.has_form_fields,
        "fields": forms.fields,
        "values": forms.values,
    }))
}

fn export(
    pdf: &Path,
    annotations: &Path,
    out_dir: Option<&Path>,
    config: AnnotatorConfig,
) -> anyhow::Result<PathBuf> {
    let mut session = open_session(pdf, read_pdf(pdf)?, config)?;
    let json = fs::read_to_string(annotations)
        .with_context(|| format!("Failed to read annotations: {}", annotations.display()))?;
    session
        .import_json(&json)
        .with_context(|| format!("Invalid annotations: {}", annotations.display()))?;

    let output = session.export()?;
    for warning in &output.warnings {
        tracing::warn!("{}", warning);
    }

    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| pdf.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let target = dir.join(&output.file_name);
    fs::write(&target, &output.bytes)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    tracing::info!(
        "Wrote {} ({} boxes, {} text annotations)",
        target.display(),
        session.store().boxes().len(),
        session.store().texts().len()
    );
    Ok(target)
}
