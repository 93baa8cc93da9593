use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use libmandarat::chunk::Chunks;
use libmandarat::codec::{Codec, CodecError, MandaratCell, MANDARAT_KEY};
use libmandarat::{file, testlib};

#[derive(Parser, Debug)]
#[command(
    name = "mandarat-png",
    version = libmandarat::version(),
    about = "Embed and extract Mandarat grid data in PNG tEXt chunks"
)]
struct Cli {
    #[arg(long, default_value = MANDARAT_KEY, global = true, help = "tEXt keyword holding the payload")]
    key: String,
    #[arg(
        long = "verify-crc",
        action = ArgAction::SetTrue,
        global = true,
        help = "Treat chunks with a bad CRC as corruption"
    )]
    verify_crc: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed a JSON cell list into a PNG
    Embed {
        input: PathBuf,
        /// JSON array of {"position", "title"} objects
        cells: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Locate IEND by walking the chunk stream instead of assuming the last 12 bytes
        #[arg(long, action = ArgAction::SetTrue)]
        traverse: bool,
    },
    /// Print the embedded cell list as JSON
    Extract { input: PathBuf },
    /// List chunks and tEXt entries
    Inspect { input: PathBuf },
    /// Write a small PNG carrying a sample payload
    Sample {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = 9)]
        size: u32,
    },
}

/// Initialize the global `tracing` subscriber from `RUST_LOG`, defaulting to `info`.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let codec = Codec::builder().key(cli.key).verify_crc(cli.verify_crc).build();

    match run(&codec, cli.command).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    }
}

async fn run(codec: &Codec, command: Command) -> Result<bool, CodecError> {
    match command {
        Command::Embed { input, cells, output, traverse } => {
            let json = tokio::fs::read_to_string(&cells).await?;
            let cells: Vec<MandaratCell> = serde_json::from_str(&json)?;
            file::write_with_cells(codec, &input, &output, &cells, traverse).await?;
            Ok(true)
        }
        Command::Extract { input } => {
            // Only an unreadable file is an error; anything else without a payload is "no data"
            let cells = match file::try_read_cells(codec, &input).await {
                Ok(cells) => cells,
                Err(CodecError::Io(err)) => return Err(err.into()),
                Err(err) => {
                    tracing::debug!(path = %input.display(), error = %err, "payload unreadable");
                    None
                }
            };
            match cells {
                Some(cells) => {
                    println!("{}", serde_json::to_string_pretty(&cells)?);
                    Ok(true)
                }
                None => {
                    eprintln!("{} does not contain {} data", input.display(), codec.key());
                    Ok(false)
                }
            }
        }
        Command::Inspect { input } => {
            let bytes = tokio::fs::read(&input).await?;
            println!("File size: {} bytes", bytes.len());
            for chunk in Chunks::new(&bytes)? {
                let chunk = chunk?;
                println!(
                    "{:>10}  {}  {:>10} bytes  crc {:#010x} {}",
                    chunk.offset(),
                    chunk.type_name(),
                    chunk.data().len(),
                    chunk.crc(),
                    if chunk.crc_matches() { "ok" } else { "BAD" }
                );
            }
            for (key, value) in codec.text_entries(&bytes)? {
                let marker = if key == codec.key() { "*" } else { " " };
                println!("{} tEXt {:?}: {} bytes", marker, key, value.len());
            }
            Ok(true)
        }
        Command::Sample { output, size } => {
            let png = testlib::minimal_png(size, size)?;
            let out = codec.embed(&png, &testlib::sample_cells());
            tokio::fs::write(&output, &out).await?;
            println!("Wrote {} ({} bytes)", output.display(), out.len());
            Ok(true)
        }
    }
}
