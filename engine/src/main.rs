//! # menupress CLI
//!
//! Usage:
//!   menupress menu.json -o out/
//!   cat menu.json | menupress --asset-base https://cdn.example/menu
//!   menupress --example > menu.json

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use menupress::{ExportConfig, Exporter, MenuRecord};

#[derive(Parser, Debug)]
#[command(name = "menupress", version, about = "Export a drinks menu to a one-page PDF")]
struct Args {
    /// Menu JSON file, or '-' / nothing for stdin
    input: Option<PathBuf>,

    /// Directory the PDF is written to
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Directory or URL that asset paths are resolved against
    #[arg(long = "asset-base")]
    asset_base: Option<String>,

    /// File name prefix
    #[arg(long = "prefix")]
    prefix: Option<String>,

    /// Footer branding
    #[arg(long = "branding")]
    branding: Option<String>,

    /// Command used to open the preview, e.g. "xdg-open"
    #[arg(long = "open")]
    open: Option<String>,

    /// Put right-column images on the right
    #[arg(long = "alternate-sides")]
    alternate_sides: bool,

    /// Also write the export record as JSON to this path
    #[arg(long = "record")]
    record: Option<PathBuf>,

    /// Print a sample menu and exit
    #[arg(long = "example")]
    example: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.example {
        print!("{}", example_menu_json());
        return Ok(());
    }

    let mut config = ExportConfig::from_env()?;
    apply_overrides(&mut config, &args);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let input = read_input(args.input.as_deref())?;
    let record = MenuRecord::from_json(&input)?;

    let exporter = Exporter::from_config(config)?;
    let outcome = exporter.export_record(record).await?;

    if let Some(path) = &args.record {
        let json = serde_json::to_string_pretty(&outcome.record)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write export record to {}", path.display()))?;
    }

    eprintln!(
        "✓ Written {} bytes to {}",
        outcome.byte_len,
        outcome.file_path.display()
    );
    if !outcome.truncated.is_empty() {
        eprintln!("! {} item(s) did not fit: {}", outcome.truncated.len(), outcome.truncated.join(", "));
    }

    // Keep the preview alive for the viewer until its handle expires.
    if exporter.config().viewer.is_some() {
        info!(seconds = exporter.config().handle_ttl.as_secs(), "holding preview for viewer");
        tokio::time::sleep(exporter.config().handle_ttl).await;
    }
    exporter.cleanup();

    Ok(())
}

fn apply_overrides(config: &mut ExportConfig, args: &Args) {
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(base) = &args.asset_base {
        config.asset_base = base.clone();
    }
    if let Some(prefix) = &args.prefix {
        config.file_prefix = prefix.clone();
    }
    if let Some(branding) = &args.branding {
        config.branding = branding.clone();
    }
    if let Some(open) = &args.open {
        config.viewer = Some(open.clone());
    }
    if args.alternate_sides {
        config.geometry.alternate_sides = true;
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn example_menu_json() -> &'static str {
    r#"{
  "menuId": "happy-hour",
  "name": "Happy Hour",
  "items": [
    {
      "id": "1",
      "name": "Negroni",
      "description": "Gin, Campari and sweet vermouth, stirred over ice with an orange twist.",
      "imageUrl": "images/negroni.png",
      "displayOrder": 1
    },
    {
      "id": "2",
      "name": "Aperol Spritz",
      "description": "Aperol, prosecco and a splash of soda.",
      "imageUrl": "images/spritz.png",
      "displayOrder": 2
    },
    {
      "id": "3",
      "name": "Caipirinha",
      "description": "Cachaça, lime and sugar.",
      "imageUrl": "images/caipirinha.png",
      "displayOrder": 3
    },
    {
      "id": "4",
      "name": "Pink Lemonade",
      "description": "Lemon, raspberry and soda.",
      "displayOrder": 4
    },
    {
      "id": "5",
      "name": "Virgin Mojito",
      "description": "Mint, lime, sugar and soda.",
      "displayOrder": 5
    }
  ]
}
"#
}
