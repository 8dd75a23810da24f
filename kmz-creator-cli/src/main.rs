use anyhow::{Context, Result};
use clap::Parser;
use kmz_creator::{Session, DEFAULT_DATUM};
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod shell;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 起動時に開くKMZファイル
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// UTM変換の既定の測地系 (WGS84, NAD83, ETRS89)
    #[arg(short, long, default_value = DEFAULT_DATUM)]
    datum: String,
}

fn main() -> Result<()> {
    // ログはシェル出力と混ざらないよう stderr へ
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut session = Session::new();
    session
        .set_datum(&args.datum)
        .context("Invalid --datum value")?;

    if let Some(file) = &args.file {
        info!("Opening KMZ file: {:?}", file);
        let warnings = session
            .open(file)
            .with_context(|| format!("Failed to open {}", file.display()))?;
        shell::print_warnings(&warnings);
        println!("KMZ file {} loaded successfully.", file.display());
    }

    let mut editor = DefaultEditor::new().context("Failed to initialize line editor")?;
    shell::run(&mut session, &mut editor)
}
