//! VSA Attest CLI
//!
//! Entry point for the `vsa-attest` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vsa_attest::attest::{Ed25519Signer, Signer};
use vsa_attest::config::{VsaConfig, DEFAULT_CONFIG_PATH};
use vsa_attest::lookup::{self, DigestMap};
use vsa_attest::{
    ComponentGenerator, Context, Filesystem, OsFs, PredicateGenerator, Report, Service, UploadKind,
};

#[derive(Parser)]
#[command(name = "vsa-attest")]
#[command(about = "Generate and sign Verification Summary Attestations", version)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, sign and upload VSAs for every component and the snapshot
    Attest {
        /// Policy evaluation report (JSON)
        #[arg(long, short = 'r')]
        report: PathBuf,

        /// Base64 Ed25519 signing key (overrides signing_key_path)
        #[arg(long, short = 'k')]
        key: Option<PathBuf>,

        /// Config file (default: .vsa/config.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Upload strategy: none, oci or rekor
        #[arg(long)]
        upload: Option<UploadKind>,

        /// JSON map of image reference to digest, for unpinned images
        #[arg(long)]
        digests: Option<PathBuf>,

        /// Components processed concurrently
        #[arg(long, short = 'j')]
        parallelism: Option<usize>,

        /// Output the batch summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a signing key
    Keygen {
        /// Where to write the key (must not exist)
        #[arg(long, short = 'o')]
        out: PathBuf,
    },

    /// Print the predicate for one component without writing or signing it
    Predicate {
        /// Policy evaluation report (JSON)
        #[arg(long, short = 'r')]
        report: PathBuf,

        /// Component name
        #[arg(long)]
        component: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Attest {
            report,
            key,
            config,
            upload,
            digests,
            parallelism,
            json,
        } => {
            let overrides = cli_overrides(upload, parallelism);
            run_attest(&report, key, config, overrides, digests, json);
        }
        Commands::Keygen { out } => {
            run_keygen(&out);
        }
        Commands::Predicate { report, component } => {
            run_predicate(&report, &component);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cli_overrides(upload: Option<UploadKind>, parallelism: Option<usize>) -> Option<serde_json::Value> {
    let mut map = serde_json::Map::new();
    if let Some(upload) = upload {
        map.insert("upload".to_string(), serde_json::json!(upload));
    }
    if let Some(n) = parallelism {
        map.insert("parallelism".to_string(), serde_json::json!(n));
    }
    (!map.is_empty()).then_some(serde_json::Value::Object(map))
}

fn load_report(path: &Path) -> Report {
    match Report::from_file(path) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error loading report: {}", e);
            process::exit(1);
        }
    }
}

fn run_attest(
    report_path: &Path,
    key: Option<PathBuf>,
    config_path: Option<PathBuf>,
    overrides: Option<serde_json::Value>,
    digests: Option<PathBuf>,
    json_output: bool,
) {
    if let Some(ref path) = config_path {
        if !path.exists() {
            eprintln!("Config file not found: {}", path.display());
            process::exit(1);
        }
    }
    let config_path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = match VsaConfig::build(Some(&config_path), overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let report = load_report(report_path);

    let Some(key_path) = key.or_else(|| config.signing_key_path.clone()) else {
        eprintln!("No signing key: pass --key or set signing_key_path");
        process::exit(1);
    };
    let signer = match Ed25519Signer::from_key_file(&key_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading signing key {}: {}", key_path.display(), e);
            process::exit(1);
        }
    };
    info!(key_id = %signer.key_id(), "loaded signing key");

    let digest_map = match digests {
        Some(path) => match DigestMap::load(&path) {
            Ok(map) => map,
            Err(e) => {
                eprintln!("Error loading digest map: {}", e);
                process::exit(1);
            }
        },
        None => DigestMap::new(),
    };

    let ctx = config.context();
    let handler_ctx = ctx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("received interrupt, cancelling");
        handler_ctx.cancel();
    }) {
        warn!(error = %e, "failed to install signal handler");
    }

    let service = Service::builder(Arc::new(signer))
        .fs(Arc::new(OsFs::new()))
        .config(&config)
        .build();

    let summary = match service.process_all_vsas(&ctx, &report, lookup::git_url, |c| {
        digest_map.resolve(c)
    }) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    if json_output {
        match summary.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("{}", summary.summary());
        for outcome in &summary.components {
            match (&outcome.envelope_path, &outcome.error) {
                (Some(path), _) => println!("  {}: {}", outcome.name, path.display()),
                (None, Some(err)) => println!("  {}: skipped ({})", outcome.name, err),
                (None, None) => println!("  {}: skipped", outcome.name),
            }
        }
        println!(
            "  snapshot {}: {}",
            summary.snapshot.name,
            summary.snapshot.envelope_path.display()
        );
    }
}

fn run_keygen(out: &Path) {
    let signer = Ed25519Signer::generate();
    let encoded = signer.to_base64();

    if let Err(e) = OsFs::new().write_file(out, encoded.as_bytes(), 0o600) {
        eprintln!("Error writing key to {}: {}", out.display(), e);
        process::exit(1);
    }

    println!("Wrote signing key to {}", out.display());
    println!("Key ID: {}", signer.key_id());
}

fn run_predicate(report_path: &Path, component_name: &str) {
    let report = load_report(report_path);

    let Some(component) = report.component(component_name) else {
        eprintln!("Component '{}' not found in report.", component_name);
        eprintln!(
            "Available components: {}",
            report
                .components
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        process::exit(1);
    };

    let generator = ComponentGenerator::new(&report, component);
    let predicate = match generator.generate_predicate(&Context::new()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error generating predicate: {}", e);
            process::exit(1);
        }
    };

    match predicate.to_json_pretty() {
        Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
