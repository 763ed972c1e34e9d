use anyhow::{Context, Result};
use clap::{error::ErrorKind, Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use video_transcriber::{create_backend, AudioExtractor, BackendKind, Config, TranscriptionPipeline};

fn cli() -> Command {
    Command::new("video-transcriber")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Speaker-labeled transcript of a video via a remote diarization service")
        .arg(
            Arg::new("video-file")
                .value_name("VIDEO")
                .help("Video (or audio) file to transcribe")
                .required(true),
        )
        .arg(
            Arg::new("backend")
                .short('b')
                .long("backend")
                .value_name("BACKEND")
                .help("Transcription service to use")
                .value_parser(["openai", "assemblyai"]),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to a TOML configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() {
    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e);
            std::process::exit(0);
        }
        Err(_) => {
            println!("{}", cli().render_usage());
            std::process::exit(1);
        }
    };

    // stdout is reserved for the result line; logs go to stderr
    let default_filter = if matches.get_flag("verbose") { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match run(&matches).await {
        Ok(output) => println!("Transcription saved to: {}", output.display()),
        Err(e) => {
            println!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(matches: &ArgMatches) -> Result<PathBuf> {
    let video = PathBuf::from(
        matches
            .get_one::<String>("video-file")
            .context("missing video file argument")?,
    );

    dotenvy::dotenv().context("Error loading .env file")?;

    let mut config = Config::load(matches.get_one::<String>("config").map(Path::new))
        .context("Error loading configuration")?;
    if let Some(backend) = matches.get_one::<String>("backend") {
        config.transcription.backend = backend.parse::<BackendKind>()?;
    }
    config.validate()?;
    info!("Configuration: {}", config.summary());

    let backend = create_backend(&config)?;
    let media = Arc::new(AudioExtractor::from_config(&config.audio));
    let pipeline = TranscriptionPipeline::new(media, backend, &config);

    pipeline
        .run(&video)
        .await
        .with_context(|| format!("Error transcribing {}", video.display()))
}
