// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use localca::acme::{DEFAULT_LIVE_DIR, DEFAULT_PROGRAM};
use localca::trust::{firefox_command, node_hint, Platform};
use localca::{
    AcmeClient, AcmeRequest, CaState, CertificateAuthority, Config, Error, LeafCertificateRequest,
    LeafIssuer, OutputPaths, Paths, Result, SubjectFields,
};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// Helper functions
// ============================================================================

/// Display a confirmation prompt and return true if user confirms with 'y' or 'yes'
fn confirm_prompt(message: &str) -> bool {
    print!("{} [y/N] ", message);
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    let input = input.trim().to_lowercase();
    input == "y" || input == "yes"
}

// ============================================================================
// CLI definitions
// ============================================================================

#[derive(Parser)]
#[command(name = "localca")]
#[command(about = "Local certificate authority for development TLS")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    localca init                                   # Create the local CA
    localca issue                                  # localhost, 127.0.0.1, ::1
    localca issue myserver.local --san \"*.myserver.local\" --san 192.168.1.100
    localca issue -k server.key -c server.crt -d 730
    localca trust-help                             # How to trust the CA")]
struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// CA directory (overrides LOCALCA_ROOT)
    #[arg(long, global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the CA if it does not exist yet
    Init {
        /// CA validity in days (default from config: 3650)
        #[arg(long)]
        ca_days: Option<u32>,

        /// CA key size in bits (default from config: 4096)
        #[arg(long)]
        ca_key_bits: Option<u32>,

        /// Common name of the root certificate
        #[arg(long)]
        ca_name: Option<String>,
    },

    /// Issue a CA-signed certificate and key
    Issue {
        /// Hostname for the certificate
        #[arg(default_value = "localhost")]
        hostname: String,

        /// Additional Subject Alternative Name (repeatable)
        #[arg(long = "san", value_name = "NAME")]
        sans: Vec<String>,

        /// Days until expiration (default from config: 365)
        #[arg(short, long)]
        days: Option<u32>,

        /// Key size in bits (default from config: 2048)
        #[arg(short = 's', long = "size")]
        key_bits: Option<u32>,

        /// Output directory for <hostname>.key and <hostname>.crt
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Private key file (overrides the default name)
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Certificate file (overrides the default name)
        #[arg(short, long)]
        cert: Option<PathBuf>,

        /// Replace existing files without asking
        #[arg(long)]
        overwrite: bool,

        /// Country code
        #[arg(long)]
        country: Option<String>,

        /// State or province
        #[arg(long)]
        state: Option<String>,

        /// City or locality
        #[arg(long)]
        city: Option<String>,

        /// Organization
        #[arg(long)]
        org: Option<String>,
    },

    /// Show details of a certificate file
    Inspect {
        /// Certificate file (PEM)
        file: PathBuf,

        /// Check that the certificate was signed by the local CA
        #[arg(long)]
        verify: bool,
    },

    /// Show CA status
    Status,

    /// Show CA file locations
    Path,

    /// Obtain a publicly trusted certificate through an external ACME client (DNS-01)
    Acme {
        /// Domain to certify
        domain: String,

        /// ACME account email
        #[arg(long)]
        email: String,

        /// Use the ACME staging environment
        #[arg(long)]
        staging: bool,

        /// Directory receiving cert.crt and cert.key
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// ACME client executable
        #[arg(long, default_value = DEFAULT_PROGRAM)]
        program: String,

        /// Directory where the ACME client stores issued certificates
        #[arg(long, default_value = DEFAULT_LIVE_DIR)]
        live_dir: PathBuf,
    },

    /// Print instructions for trusting the CA certificate
    TrustHelp {
        /// Show instructions for every platform
        #[arg(long)]
        all: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Output helper that respects --quiet and --verbose flags.
#[derive(Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }

    /// Print a standard message (suppressed with --quiet)
    fn print(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a verbose message (only shown with --verbose)
    fn verbose(&self, msg: &str) {
        if self.verbose {
            println!("{}", msg);
        }
    }
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    // This prevents "broken pipe" panics when output is piped to tools like grep/head
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = localca::telemetry::init_tracing(cli.verbose) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let paths = match &cli.dir {
        Some(dir) => Paths::at(dir),
        None => Paths::new()?,
    };
    let out = Output::new(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Init {
            ca_days,
            ca_key_bits,
            ca_name,
        } => cmd_init(&paths, ca_days, ca_key_bits, ca_name, out),
        Commands::Issue {
            hostname,
            sans,
            days,
            key_bits,
            out_dir,
            key,
            cert,
            overwrite,
            country,
            state,
            city,
            org,
        } => {
            let subject = SubjectFields {
                country,
                state,
                locality: city,
                organization: org,
            };
            cmd_issue(
                &paths,
                IssueArgs {
                    hostname,
                    sans,
                    days,
                    key_bits,
                    subject,
                    out_dir,
                    key,
                    cert,
                    overwrite,
                },
                out,
            )
        }
        Commands::Inspect { file, verify } => cmd_inspect(&paths, &file, verify),
        Commands::Status => cmd_status(&paths),
        Commands::Path => cmd_path(&paths),
        Commands::Acme {
            domain,
            email,
            staging,
            out_dir,
            program,
            live_dir,
        } => cmd_acme(
            AcmeClient::new(program, live_dir),
            AcmeRequest {
                domain,
                email,
                staging,
            },
            &out_dir,
            out,
        ),
        Commands::TrustHelp { all } => cmd_trust_help(&paths, all),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

fn cmd_init(
    paths: &Paths,
    ca_days: Option<u32>,
    ca_key_bits: Option<u32>,
    ca_name: Option<String>,
    out: Output,
) -> Result<()> {
    let mut config = Config::load(&paths.config)?;
    if let Some(days) = ca_days {
        config.ca_days = days;
    }
    if let Some(bits) = ca_key_bits {
        config.ca_key_bits = bits;
    }
    if let Some(name) = ca_name {
        config.ca_subject.common_name = name;
    }

    let existed = CaState::detect(paths) == CaState::Complete;
    if existed {
        out.print("CA already initialized; reusing it.");
    } else {
        out.print("Initializing localca...");
        out.print(&format!(
            "  Generating {}-bit CA key (this can take a few seconds)...",
            config.ca_key_bits
        ));
    }

    let ca = CertificateAuthority::bootstrap(paths, &config)?;

    if !paths.config.exists() {
        config.save(&paths.config)?;
        out.verbose(&format!("  Config saved to {}", paths.config.display()));
    }

    out.verbose(&format!("  Subject: {}", ca.subject()?));
    out.verbose(&format!("  Next serial: {}", ca.peek_serial()?));

    out.print("");
    println!("CA certificate: {}", paths.ca_cert.display());
    println!("CA key:         {}", paths.ca_key.display());
    if !existed {
        out.print("");
        out.print("Trust the CA so browsers accept issued certificates:");
        out.print("  localca trust-help");
    }
    Ok(())
}

struct IssueArgs {
    hostname: String,
    sans: Vec<String>,
    days: Option<u32>,
    key_bits: Option<u32>,
    subject: SubjectFields,
    out_dir: PathBuf,
    key: Option<PathBuf>,
    cert: Option<PathBuf>,
    overwrite: bool,
}

fn output_paths(args: &IssueArgs) -> Result<OutputPaths> {
    match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => Ok(OutputPaths {
            cert: cert.clone(),
            key: key.clone(),
        }),
        (cert, key) => {
            let default = OutputPaths::for_name(&args.out_dir, &args.hostname)?;
            Ok(OutputPaths {
                cert: cert.clone().unwrap_or(default.cert),
                key: key.clone().unwrap_or(default.key),
            })
        }
    }
}

fn cmd_issue(paths: &Paths, args: IssueArgs, out: Output) -> Result<()> {
    let config = Config::load(&paths.config)?;

    let base = if args.hostname == "localhost" {
        LeafCertificateRequest::localhost()
    } else {
        LeafCertificateRequest::new(args.hostname.clone())
    };
    let subject = SubjectFields {
        country: args.subject.country.clone().or(config.leaf_subject.country.clone()),
        state: args.subject.state.clone().or(config.leaf_subject.state.clone()),
        locality: args
            .subject
            .locality
            .clone()
            .or(config.leaf_subject.locality.clone()),
        organization: args
            .subject
            .organization
            .clone()
            .or(config.leaf_subject.organization.clone()),
    };
    let request = base
        .with_sans(args.sans.iter().cloned())
        .with_validity_days(args.days.unwrap_or(config.cert_days))
        .with_key_bits(args.key_bits.unwrap_or(config.key_bits))
        .with_subject(subject);

    // Reject bad input before a CA is created for it
    request.validate()?;
    let outputs = output_paths(&args)?;

    let mut overwrite = args.overwrite;
    if !overwrite {
        let existing: Vec<String> = [&outputs.key, &outputs.cert]
            .into_iter()
            .filter(|p| p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if !existing.is_empty() {
            if !io::stdin().is_terminal() {
                return Err(Error::OutputExists(PathBuf::from(&existing[0])));
            }
            println!(
                "Warning: The following files already exist: {}",
                existing.join(", ")
            );
            if !confirm_prompt("Overwrite?") {
                println!("Aborted.");
                return Ok(());
            }
            overwrite = true;
        }
    }

    if CaState::detect(paths) == CaState::Absent {
        out.print(&format!(
            "No CA found; creating one in {}",
            paths.base.display()
        ));
    }
    let ca = CertificateAuthority::bootstrap(paths, &config)?;

    out.print("Generating certificate...");
    out.print(&format!("  Hostname: {}", request.common_name));
    out.print(&format!("  Validity: {} days", request.validity_days));
    out.print(&format!("  Key size: {} bits", request.key_bits));
    let sans: Vec<String> = request
        .resolved_sans()
        .iter()
        .map(ToString::to_string)
        .collect();
    out.print(&format!("  SANs: {}", sans.join(", ")));

    let issued = LeafIssuer::new(&ca).issue_into(&request, &outputs, overwrite)?;
    if let Some(warning) = &issued.warning {
        eprintln!("Warning: {}", warning);
    }

    out.print("");
    out.print("Certificate generated successfully!");
    println!("  Private key: {}", outputs.key.display());
    println!("  Certificate: {}", outputs.cert.display());
    out.print("");
    out.print("To run a server with TLS:");
    out.print(&format!(
        "  --tls-keyfile {} --tls-certfile {}",
        outputs.key.display(),
        outputs.cert.display()
    ));

    if out.verbose {
        let info = localca::parse_cert_pem(&issued.cert_pem)?;
        out.verbose("");
        out.verbose("Certificate details:");
        out.verbose(&format!("  Serial: {}", issued.serial));
        out.verbose(&format!("  Not Before: {}", issued.not_before));
        out.verbose(&format!("  Not After: {}", issued.not_after));
        out.verbose(&format!("  Subject: {}", info.subject));
        out.verbose(&format!("  Issuer: {}", info.issuer));
    }
    Ok(())
}

fn cmd_inspect(paths: &Paths, file: &Path, verify: bool) -> Result<()> {
    let info = localca::parse_cert_file(file)?;

    println!("Certificate: {}", file.display());
    println!("===========");
    println!();
    println!("Serial:     {}", info.serial_hex);
    println!("Subject:    {}", info.subject);
    println!("Issuer:     {}", info.issuer);
    if let Some(cn) = &info.common_name {
        println!("Common Name: {}", cn);
    }
    if !info.subject_alt_names.is_empty() {
        println!("SANs:       {}", info.san_summary());
    }
    if info.is_ca {
        println!("Type:       CA");
    } else if info.server_auth {
        println!("Type:       TLS Server (serverAuth)");
    }
    println!();

    // Validity
    let days = info.days_remaining();
    if days < 0 {
        println!("Status:     EXPIRED ({} days ago)", -days);
    } else if days <= 7 {
        println!("Status:     Expiring soon ({} days)", days);
    } else {
        println!("Status:     Valid ({} days remaining)", days);
    }
    println!("Issued:     {}", info.issued_string());
    println!("Expires:    {}", info.expiry_string());

    if verify {
        let leaf_pem = std::fs::read_to_string(file).map_err(|e| Error::ReadFile {
            path: file.to_path_buf(),
            source: e,
        })?;
        let ca = CertificateAuthority::load(paths)?;
        localca::verify_issued_by(&leaf_pem, ca.cert_pem())?;
        println!();
        println!("Verified:   signed by {}", ca.subject()?);
    }
    Ok(())
}

fn cmd_status(paths: &Paths) -> Result<()> {
    println!("localca status");
    println!("==============");
    println!();

    print!("CA: ");
    match CaState::detect(paths) {
        CaState::Absent => {
            println!("not initialized");
            println!("    Run 'localca init' to set up");
            return Ok(());
        }
        CaState::Partial { .. } => {
            println!("INCONSISTENT");
            // load() reports which files are missing
            CertificateAuthority::load(paths)?;
            return Ok(());
        }
        CaState::Complete => println!("initialized"),
    }

    let ca = CertificateAuthority::load(paths)?;
    let info = localca::parse_cert_pem(ca.cert_pem())?;
    println!("    Path:    {}", paths.ca_cert.display());
    println!("    Subject: {}", info.subject);
    println!(
        "    Expires: {} ({} days)",
        info.expiry_string(),
        info.days_remaining()
    );
    println!("    Next serial: {}", ca.peek_serial()?);
    Ok(())
}

fn cmd_path(paths: &Paths) -> Result<()> {
    println!("CA root:   {}", paths.base.display());
    println!("CA cert:   {}", paths.ca_cert.display());
    println!("CA key:    {}", paths.ca_key.display());
    println!("CA serial: {}", paths.ca_serial.display());
    println!("Config:    {}", paths.config.display());
    Ok(())
}

fn cmd_acme(client: AcmeClient, request: AcmeRequest, out_dir: &Path, out: Output) -> Result<()> {
    out.print(&format!(
        "Requesting certificate for {} via {}{}",
        request.domain,
        client.program(),
        if request.staging { " (staging)" } else { "" }
    ));
    out.print("Follow the prompts to publish the DNS TXT record.");

    client.run(&request)?;
    let (cert, key) = client.install(&request.domain, out_dir)?;

    out.print("");
    println!("  Certificate: {}", cert.display());
    println!("  Private key: {}", key.display());
    Ok(())
}

fn cmd_trust_help(paths: &Paths, all: bool) -> Result<()> {
    let ca_cert = &paths.ca_cert;
    if !ca_cert.exists() {
        println!("Note: {} does not exist yet. Run 'localca init' first.", ca_cert.display());
        println!();
    }

    let platforms: Vec<Platform> = if all {
        Platform::ALL.to_vec()
    } else {
        vec![Platform::current()]
    };

    for platform in platforms {
        println!("{}:", platform);
        for command in platform.commands(ca_cert) {
            println!("  {}", command);
        }
        println!();
    }

    let ca_name = Config::load(&paths.config)?.ca_subject.common_name;
    println!("Firefox (NSS database):");
    println!("  {}", firefox_command(ca_cert, &ca_name));
    println!();
    println!("Node.js:");
    println!("  {}", node_hint(ca_cert));
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "localca", &mut std::io::stdout());
    Ok(())
}
