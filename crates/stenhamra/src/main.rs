#![forbid(unsafe_code)]

//! Stenhamra CLI: verify XML signatures, canonicalize documents.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use stenhamra_c14n::C14nMode;
use stenhamra_core::{algorithm, Error};
use stenhamra_dsig::{
    verify_batch, BatchInput, BatchOptions, BatchOutcome, DsigContext, ReferenceReport,
    VerifyReport,
};
use stenhamra_keys::{loader, Key};
use stenhamra_transforms::{FileResolver, OfflineResolver};

#[derive(Parser)]
#[command(
    name = "stenhamra",
    about = "Stenhamra: XML digital-signature verification",
    version
)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify signed XML documents
    Verify(VerifyArgs),

    /// Print the canonical form of a document
    C14n {
        /// Input XML file
        file: PathBuf,

        /// Canonicalization algorithm URI
        #[arg(long, default_value = algorithm::C14N)]
        mode: String,
    },

    /// List supported algorithms
    Info,
}

#[derive(clap::Args)]
struct VerifyArgs {
    /// Input XML files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Verification key (PEM or DER, auto-detected)
    #[arg(short = 'k', long)]
    key: Option<PathBuf>,

    /// X.509 certificate (PEM or DER)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Raw HMAC key (binary file)
    #[arg(long = "hmac-key")]
    hmac_key: Option<PathBuf>,

    /// Serve URI from a local file (URI=FILE)
    #[arg(long = "url-map")]
    url_map: Vec<String>,

    /// Base directory for relative references (default: the document's directory)
    #[arg(long = "base-dir")]
    base_dir: Option<PathBuf>,

    /// Verify the references of nested manifests
    #[arg(long = "follow-manifests")]
    follow_manifests: bool,

    /// Take the key from KeyValue before X509Data
    #[arg(long = "prefer-key")]
    prefer_key: bool,

    /// Maximum manifest nesting depth
    #[arg(long = "max-manifest-depth", default_value_t = stenhamra_dsig::context::DEFAULT_MAX_MANIFEST_DEPTH)]
    max_manifest_depth: usize,

    /// Time limit per resource resolution, in milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Worker threads (0 = available parallelism)
    #[arg(short = 'j', long, default_value_t = 0)]
    jobs: usize,

    /// Register additional ID attribute names
    #[arg(long = "id-attr")]
    id_attr: Vec<String>,

    /// Print per-reference results
    #[arg(long)]
    report: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Verify(args) => cmd_verify(args, cli.verbose),
        Commands::C14n { file, mode } => cmd_c14n(&file, &mode),
        Commands::Info => cmd_info(),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}

/// Returns `Ok(true)` when every document verified.
fn cmd_verify(args: VerifyArgs, verbose: bool) -> Result<bool, Error> {
    let ctx = build_context(&args, verbose)?;

    let mut inputs = Vec::new();
    let mut all_valid = true;
    for file in &args.files {
        match read_file(file) {
            Ok(xml) => inputs.push(BatchInput {
                name: file.display().to_string(),
                xml,
            }),
            Err(e) => {
                println!("{}: ERROR: {e}", file.display());
                all_valid = false;
            }
        }
    }

    log::debug!("verifying {} documents", inputs.len());
    let options = BatchOptions {
        jobs: args.jobs,
        cancel: None,
    };
    let prefix_names = args.files.len() > 1;
    for entry in verify_batch(&ctx, &inputs, &options) {
        all_valid &= entry.is_valid();
        let line = match &entry.outcome {
            BatchOutcome::Verified(report) => report.result.to_string(),
            BatchOutcome::Failed(e) => format!("ERROR: {e}"),
            BatchOutcome::Skipped => "SKIPPED".to_owned(),
        };
        if prefix_names {
            println!("{}: {line}", entry.name);
        } else {
            println!("{line}");
        }
        if let (true, BatchOutcome::Verified(report)) = (args.report, &entry.outcome) {
            print_report(report);
        }
    }
    Ok(all_valid)
}

fn build_context(args: &VerifyArgs, verbose: bool) -> Result<DsigContext, Error> {
    let mut ctx = DsigContext::new();
    ctx.debug = verbose;
    ctx.follow_nested_manifests = args.follow_manifests;
    ctx.prefer_certificate_over_key = !args.prefer_key;
    ctx.max_manifest_depth = args.max_manifest_depth;
    ctx.resolve_timeout = args.timeout_ms.map(Duration::from_millis);
    for attr in &args.id_attr {
        ctx.add_id_attr(attr);
    }

    if let Some(key) = load_external_key(args)? {
        ctx.set_external_key(key);
    }

    if !args.url_map.is_empty() {
        let mut offline = OfflineResolver::new();
        for mapping in &args.url_map {
            let (uri, file) = mapping.split_once('=').ok_or_else(|| {
                Error::Other(format!("invalid url-map: {mapping} (expected URI=FILE)"))
            })?;
            offline.add_file(uri, file)?;
        }
        ctx.add_resolver(Box::new(offline));
    }

    // One shared context serves every file, so the document directory is
    // only a usable default when there is a single file.
    let base_dir = match (&args.base_dir, args.files.as_slice()) {
        (Some(dir), _) => Some(dir.clone()),
        (None, [single]) => single.parent().map(Path::to_path_buf),
        (None, _) => None,
    };
    ctx.base_dir = base_dir;
    ctx.add_resolver(Box::new(FileResolver::new()));
    Ok(ctx)
}

fn load_external_key(args: &VerifyArgs) -> Result<Option<Key>, Error> {
    let given = [&args.key, &args.cert, &args.hmac_key]
        .iter()
        .filter(|k| k.is_some())
        .count();
    if given > 1 {
        return Err(Error::Other(
            "use only one of --key, --cert and --hmac-key".into(),
        ));
    }
    if let Some(path) = &args.key {
        return loader::load_key_file(path).map(Some);
    }
    if let Some(path) = &args.cert {
        return loader::load_cert_file(path).map(Some);
    }
    if let Some(path) = &args.hmac_key {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Other(format!("{}: {e}", path.display())))?;
        return Ok(Some(loader::load_hmac_key(&bytes)));
    }
    Ok(None)
}

fn print_report(report: &VerifyReport) {
    if let Some(source) = report.key_source {
        match &report.key_name {
            Some(name) => println!("  key: {source:?} ({name})"),
            None => println!("  key: {source:?}"),
        }
    }
    for reference in &report.references {
        print_reference(reference, 1);
    }
    if let Some(valid) = report.signature_value_valid {
        println!("  SignatureValue: {}", if valid { "valid" } else { "invalid" });
    }
}

fn print_reference(reference: &ReferenceReport, depth: usize) {
    println!("{:indent$}Reference {}", "", reference.describe(), indent = depth * 2);
    for inner in &reference.manifest {
        print_reference(inner, depth + 1);
    }
}

fn cmd_c14n(file: &Path, mode: &str) -> Result<bool, Error> {
    let mode = C14nMode::require(mode)?;
    let xml = read_file(file)?;
    let out = stenhamra_c14n::canonicalize(&xml, mode, None, &[])?;
    use std::io::Write;
    std::io::stdout()
        .write_all(&out)
        .map_err(|e| Error::Other(format!("stdout: {e}")))?;
    Ok(true)
}

fn cmd_info() -> Result<bool, Error> {
    println!("Stenhamra: XML digital-signature verification");
    println!();
    println!("Digest algorithms:");
    for uri in stenhamra_crypto::digest::SUPPORTED {
        println!("  {uri}");
    }
    println!();
    println!("Signature algorithms:");
    for uri in stenhamra_crypto::sign::SUPPORTED {
        println!("  {uri}");
    }
    println!();
    println!("Canonicalization:");
    for mode in [
        C14nMode::Inclusive,
        C14nMode::InclusiveWithComments,
        C14nMode::Inclusive11,
        C14nMode::Inclusive11WithComments,
        C14nMode::Exclusive,
        C14nMode::ExclusiveWithComments,
    ] {
        println!("  {}", mode.uri());
    }
    println!();
    println!("Transforms:");
    println!("  {}", algorithm::ENVELOPED_SIGNATURE);
    println!("  {}", algorithm::BASE64);
    println!("  {} (signature exclusion only)", algorithm::XPATH);
    println!();
    println!("Key formats:");
    println!("  PEM, DER (RSA, EC P-256/P-384, DSA), X.509 certificates, raw binary (HMAC)");
    Ok(true)
}

// ── Utility functions ────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))
}
