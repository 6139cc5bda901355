//! cdrop: cipherdrop client-side encryption CLI
//!
//! Commands:
//!   derive-key               - derive the encryption key from a phrase or private key
//!   new-phrase               - generate a fresh recovery phrase
//!   encrypt <file>           - encrypt a local file into an envelope
//!   decrypt <envelope> -o    - decrypt a local envelope
//!   upload <file>            - encrypt and upload a file
//!   fetch <cid>              - fetch, decrypt and save one stored file
//!   decrypt-batch <listing>  - decrypt every encrypted file in a JSON listing
//!   delete <cid>             - delete a stored file
//!   config show              - display current configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cdrop_core::config::{CdropConfig, StorageBackend};
use cdrop_core::{Cid, FileRef};
use cdrop_crypto::{
    decrypt_blocking, derive_key_from_private_key, derive_key_from_recovery_phrase,
    generate_recovery_phrase, try_derive_key_from_recovery_phrase, EncryptionKey, KeySource,
    PhraseLength,
};
use cdrop_storage::{build_from_config, OperatorFetcher, UploadClient};
use cdrop_transfer::{
    prepare_upload_blocking, read_plaintext_file, BatchConfig, DecryptionCache,
    DecryptionOrchestrator, ItemOutcome, ObjectUrlRegistry, ProgressFn,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cdrop",
    version,
    about = "cipherdrop encrypted file client",
    long_about = "cdrop: encrypt files client-side, upload them, and decrypt them back from a content gateway"
)]
struct Cli {
    /// Path to cdrop.toml configuration file
    #[arg(long, short = 'c', env = "CDROP_CONFIG", default_value = "cdrop.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log].level
    #[arg(long, env = "CDROP_LOG")]
    log: Option<String>,

    /// Log format; overrides [log].format
    #[arg(long, env = "CDROP_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

/// Where the key material comes from. Without either flag the recovery
/// phrase is prompted for on the terminal.
#[derive(Args, Debug)]
struct KeyArgs {
    /// Read the recovery phrase from this environment variable
    #[arg(long, value_name = "VAR", conflicts_with = "private_key_env")]
    phrase_env: Option<String>,

    /// Read a raw wallet private key from this environment variable
    #[arg(long, value_name = "VAR")]
    private_key_env: Option<String>,

    /// Refuse to fall back to hashing the raw phrase when it is not a valid mnemonic
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive the encryption key and print its fingerprint
    #[command(name = "derive-key")]
    DeriveKey {
        #[command(flatten)]
        key: KeyArgs,
        /// Print the key itself, not just its fingerprint
        #[arg(long)]
        reveal: bool,
    },

    /// Generate a new recovery phrase (write it down; it is not stored)
    #[command(name = "new-phrase")]
    NewPhrase {
        /// Number of words: 12 or 24
        #[arg(long, default_value_t = 12)]
        words: u16,
    },

    /// Encrypt a local file into a text envelope
    Encrypt {
        input: PathBuf,
        /// Envelope destination (default: <input>.encrypted)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Decrypt a local envelope file
    Decrypt {
        input: PathBuf,
        #[arg(long, short = 'o')]
        output: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Encrypt a file and send it to the upload endpoint
    Upload {
        file: PathBuf,
        /// Owner wallet address
        #[arg(long, env = "CDROP_WALLET")]
        wallet: String,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Fetch, decrypt and save one stored file
    Fetch {
        cid: String,
        /// Original file name (used for type detection and the default output)
        #[arg(long)]
        name: Option<String>,
        /// Original MIME type, if recorded
        #[arg(long = "type")]
        mime: Option<String>,
        /// Destination path (default: the original name, or the CID)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Decrypt every encrypted file in a JSON listing of file refs
    #[command(name = "decrypt-batch")]
    DecryptBatch {
        /// JSON array of {cid, name, originalName?, originalType?, originalSize?, isEncrypted?}
        listing: PathBuf,
        /// Directory to write decrypted files into
        #[arg(long, short = 'o', default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Delete a stored file
    Delete {
        cid: String,
        /// Owner wallet address
        #[arg(long, env = "CDROP_WALLET")]
        wallet: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_found = cli.config.exists();
    let config = if config_found {
        CdropConfig::load(&cli.config)?
    } else {
        CdropConfig::default()
    };

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    if !config_found {
        warn!("config file not found: {}  (using defaults)", cli.config.display());
    }
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::DeriveKey { key, reveal } => cmd_derive_key(&key, reveal),
        Commands::NewPhrase { words } => cmd_new_phrase(words),
        Commands::Encrypt { input, output, key } => {
            cmd_encrypt(&input, output.as_deref(), &key).await
        }
        Commands::Decrypt { input, output, key } => cmd_decrypt(&input, &output, &key).await,
        Commands::Upload { file, wallet, key } => cmd_upload(&config, &file, &wallet, &key).await,
        Commands::Fetch { cid, name, mime, output, key } => {
            cmd_fetch(&config, &cid, name.as_deref(), mime.as_deref(), output.as_deref(), &key).await
        }
        Commands::DecryptBatch { listing, out_dir, key } => {
            cmd_decrypt_batch(&config, &listing, &out_dir, &key).await
        }
        Commands::Delete { cid, wallet } => cmd_delete(&config, &cid, &wallet).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Key material ──────────────────────────────────────────────────────────────

fn read_env_secret(var: &str) -> Result<SecretString> {
    let value = std::env::var(var).with_context(|| format!("environment variable {var} is not set"))?;
    Ok(SecretString::from(value))
}

/// Resolve the encryption key: private key env > phrase env > terminal prompt.
fn resolve_key(args: &KeyArgs) -> Result<EncryptionKey> {
    Ok(resolve_key_with_source(args)?.0)
}

/// Like [`resolve_key`], also reporting how a phrase-derived key was obtained
/// (`None` for a raw private key).
fn resolve_key_with_source(args: &KeyArgs) -> Result<(EncryptionKey, Option<KeySource>)> {
    if let Some(var) = &args.private_key_env {
        let private_key = read_env_secret(var)?;
        return Ok((derive_key_from_private_key(private_key.expose_secret().trim()), None));
    }

    let phrase = match &args.phrase_env {
        Some(var) => read_env_secret(var)?,
        None => SecretString::from(
            rpassword::prompt_password("Recovery phrase: ").context("reading recovery phrase")?,
        ),
    };

    if args.strict {
        let key = try_derive_key_from_recovery_phrase(phrase.expose_secret())
            .context("deriving key from recovery phrase")?;
        return Ok((key, Some(KeySource::Wallet)));
    }

    let derived = derive_key_from_recovery_phrase(phrase.expose_secret());
    if derived.is_fallback() {
        eprintln!(
            "warning: recovery phrase is not a valid mnemonic; using a key hashed from the raw phrase"
        );
    }
    let source = derived.source;
    Ok((derived.into_key(), Some(source)))
}

// ── Storage / orchestrator wiring ─────────────────────────────────────────────

/// Build the ciphertext fetcher for the configured backend.
///
/// S3 credentials come from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY (or the
/// CDROP_-prefixed equivalents).
fn build_fetcher(config: &CdropConfig) -> Result<OperatorFetcher> {
    match config.storage.backend {
        StorageBackend::Gateway => {
            let op = build_from_config(&config.storage, None)?;
            Ok(OperatorFetcher::new(op))
        }
        StorageBackend::S3 => {
            let access_key = std::env::var("AWS_ACCESS_KEY_ID")
                .or_else(|_| std::env::var("CDROP_ACCESS_KEY_ID"))
                .context(
                    "S3 credentials not set\n\
                     Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.",
                )?;
            let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
                .or_else(|_| std::env::var("CDROP_SECRET_ACCESS_KEY"))
                .context("AWS_SECRET_ACCESS_KEY not set")?;
            let op = build_from_config(&config.storage, Some((&access_key, &secret_key)))?;
            Ok(OperatorFetcher::with_prefix(op, config.storage.prefix.clone()))
        }
    }
}

fn build_orchestrator(config: &CdropConfig) -> Result<DecryptionOrchestrator<OperatorFetcher>> {
    let fetcher = Arc::new(build_fetcher(config)?);
    let cache = Arc::new(DecryptionCache::new(Arc::new(ObjectUrlRegistry::new())));
    Ok(DecryptionOrchestrator::new(
        fetcher,
        cache,
        BatchConfig::from(&config.decrypt),
    ))
}

// ── Progress display ──────────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Keep only the final path component of a server-supplied name.
fn safe_file_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

// ── `cdrop derive-key` / `cdrop new-phrase` ───────────────────────────────────

fn cmd_derive_key(args: &KeyArgs, reveal: bool) -> Result<()> {
    let (key, source) = resolve_key_with_source(args)?;

    println!("fingerprint: {}", key.fingerprint());
    let source = match source {
        None => "private key",
        Some(KeySource::Wallet) => "wallet account m/44'/60'/0'/0/0",
        Some(KeySource::PhraseFallback) => "raw phrase hash (lower assurance)",
    };
    println!("source:      {source}");
    if reveal {
        println!("key:         {}", key.as_str());
    }
    Ok(())
}

fn cmd_new_phrase(words: u16) -> Result<()> {
    let length = match words {
        12 => PhraseLength::Words12,
        24 => PhraseLength::Words24,
        other => anyhow::bail!("unsupported phrase length {other}: use 12 or 24"),
    };
    let phrase = generate_recovery_phrase(length)?;
    eprintln!("Write this phrase down and keep it offline. It is the only way to recover your files.");
    println!("{}", phrase.expose_secret());
    Ok(())
}

// ── `cdrop encrypt` / `cdrop decrypt` ─────────────────────────────────────────

async fn cmd_encrypt(input: &Path, output: Option<&Path>, key_args: &KeyArgs) -> Result<()> {
    let key = resolve_key(key_args)?;
    let file = read_plaintext_file(input).await?;
    let prepared = prepare_upload_blocking(file, key)
        .await
        .with_context(|| format!("encrypting {}", input.display()))?;

    let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
        input.with_file_name(&prepared.wrapper_name)
    });
    tokio::fs::write(&output, prepared.envelope.as_bytes())
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    info!(input = %input.display(), output = %output.display(), "encrypted");
    let metadata = serde_json::json!({
        "wrapperName": prepared.wrapper_name,
        "wrapperType": prepared.wrapper_type,
        "originalName": prepared.original_name,
        "originalType": prepared.original_type,
        "originalSize": prepared.original_size,
    });
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

async fn cmd_decrypt(input: &Path, output: &Path, key_args: &KeyArgs) -> Result<()> {
    let key = resolve_key(key_args)?;
    let envelope = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;

    let plaintext = decrypt_blocking(envelope, key)
        .await
        .with_context(|| format!("decrypting {}", input.display()))?;
    tokio::fs::write(output, &plaintext)
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    println!("Decrypted {} → {} ({})", input.display(), output.display(), fmt_bytes(plaintext.len() as u64));
    Ok(())
}

// ── `cdrop upload` / `cdrop delete` ───────────────────────────────────────────

async fn cmd_upload(config: &CdropConfig, path: &Path, wallet: &str, key_args: &KeyArgs) -> Result<()> {
    let key = resolve_key(key_args)?;
    let file = read_plaintext_file(path).await?;
    let prepared = prepare_upload_blocking(file, key)
        .await
        .with_context(|| format!("encrypting {}", path.display()))?;

    let client = UploadClient::new(&config.api)?;
    let cid = client
        .upload(&prepared, wallet)
        .await
        .with_context(|| format!("uploading {}", path.display()))?;

    println!("Uploaded:");
    println!("  name:  {}", prepared.original_name);
    println!("  type:  {}", prepared.original_type);
    println!("  size:  {}", fmt_bytes(prepared.original_size));
    println!("  cid:   {cid}");
    Ok(())
}

async fn cmd_delete(config: &CdropConfig, cid: &str, wallet: &str) -> Result<()> {
    let cid = Cid::new(cid)?;
    let client = UploadClient::new(&config.api)?;
    client.delete(&cid, wallet).await?;
    println!("Deleted {cid}");
    Ok(())
}

// ── `cdrop fetch` ─────────────────────────────────────────────────────────────

async fn cmd_fetch(
    config: &CdropConfig,
    cid: &str,
    name: Option<&str>,
    mime: Option<&str>,
    output: Option<&Path>,
    key_args: &KeyArgs,
) -> Result<()> {
    let cid = Cid::new(cid)?;
    let key = resolve_key(key_args)?;
    let orch = build_orchestrator(config)?;

    let name = name.unwrap_or(cid.as_str());
    let dest = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(safe_file_name(name, cid.as_str())));

    let written = orch
        .download(&cid, &key, name, mime, &dest)
        .await
        .with_context(|| format!("fetching {cid}"))?;
    let shown_type = orch.cache().get(&cid).map(|u| u.mime().to_string());
    orch.clear();

    println!("Fetched:");
    println!("  cid:    {cid}");
    println!("  local:  {}", dest.display());
    println!("  type:   {}", shown_type.unwrap_or_default());
    println!("  bytes:  {}", fmt_bytes(written));
    Ok(())
}

// ── `cdrop decrypt-batch` ─────────────────────────────────────────────────────

async fn cmd_decrypt_batch(
    config: &CdropConfig,
    listing: &Path,
    out_dir: &Path,
    key_args: &KeyArgs,
) -> Result<()> {
    let content = tokio::fs::read_to_string(listing)
        .await
        .with_context(|| format!("reading listing: {}", listing.display()))?;
    let files: Vec<FileRef> = serde_json::from_str(&content)
        .with_context(|| format!("parsing listing: {}", listing.display()))?;

    let key = resolve_key(key_args)?;
    let orch = build_orchestrator(config)?;
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let pb = make_progress_bar(0, "decrypt");
    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |done, total, msg| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(msg.to_string());
    });

    let report = orch
        .decrypt_batch_with_progress(&files, &key, &cancel, Some(&progress))
        .await;
    pb.finish_with_message(if report.cancelled { "cancelled" } else { "done" }.to_string());

    let mut written = 0usize;
    for item in &report.items {
        match &item.outcome {
            ItemOutcome::Resolved(url) => {
                let Some(blob) = orch.urls().resolve(url.url()) else {
                    continue;
                };
                let dest = out_dir.join(safe_file_name(&item.name, item.cid.as_str()));
                tokio::fs::write(&dest, &blob.bytes)
                    .await
                    .with_context(|| format!("writing {}", dest.display()))?;
                println!("  ok      {} → {} ({})", item.cid, dest.display(), fmt_bytes(url.size()));
                written += 1;
            }
            ItemOutcome::Failed(e) => println!("  failed  {}: {e}", item.cid),
            ItemOutcome::NotStarted => println!("  skipped {} (cancelled)", item.cid),
        }
    }
    orch.clear();

    println!();
    println!(
        "Decrypted {written} of {} encrypted file(s); {} skipped, {} failed",
        report.items.len(),
        report.skipped.len(),
        report.failed(),
    );

    if report.cancelled {
        anyhow::bail!("batch decryption cancelled");
    }
    if report.failed() > 0 {
        anyhow::bail!("{} file(s) failed to decrypt", report.failed());
    }
    Ok(())
}

// ── `cdrop config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &CdropConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_args_conflict() {
        let parsed = Cli::try_parse_from([
            "cdrop",
            "derive-key",
            "--phrase-env",
            "A",
            "--private-key-env",
            "B",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn fetch_parses_type_flag() {
        let cli = Cli::try_parse_from([
            "cdrop", "fetch", "bafyx", "--name", "a.png", "--type", "image/png",
        ])
        .unwrap();
        match cli.command {
            Commands::Fetch { cid, name, mime, .. } => {
                assert_eq!(cid, "bafyx");
                assert_eq!(name.as_deref(), Some("a.png"));
                assert_eq!(mime.as_deref(), Some("image/png"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn safe_file_name_strips_directories() {
        assert_eq!(safe_file_name("../../etc/passwd", "x"), "passwd");
        assert_eq!(safe_file_name("photo.jpg", "x"), "photo.jpg");
        assert_eq!(safe_file_name("", "bafyfallback"), "bafyfallback");
        assert_eq!(safe_file_name("..", "bafyfallback"), "bafyfallback");
    }

    #[test]
    fn private_key_env_derives_hash() {
        std::env::set_var("CDROP_TEST_PRIVATE_KEY", "0xdeadbeef\n");
        let key = resolve_key(&KeyArgs {
            phrase_env: None,
            private_key_env: Some("CDROP_TEST_PRIVATE_KEY".into()),
            strict: false,
        })
        .unwrap();
        assert_eq!(
            key.as_str(),
            "4142710b9b4caaeb000b8e5de271bbebac7f509aab2f5e61d1ed1958bfe6d583"
        );
    }

    #[test]
    fn strict_mode_rejects_invalid_phrase() {
        std::env::set_var("CDROP_TEST_BAD_PHRASE", "not a real phrase");
        let result = resolve_key(&KeyArgs {
            phrase_env: Some("CDROP_TEST_BAD_PHRASE".into()),
            private_key_env: None,
            strict: true,
        });
        assert!(result.is_err());
    }

    #[test]
    fn fmt_bytes_units() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
