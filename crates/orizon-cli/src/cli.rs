//! Subcommand surface (spec §6) and its dispatch to C3-C7.

use crate::backend::{open_registry, registry_spec, registry_token};
use crate::colors;
use crate::identity::{self, Identity};
use crate::manifest::Manifest;
use clap::{Parser, Subcommand};
use orizon_core::{Constraint, OrizonError, PackageId};
use orizon_lockfile::Lockfile;
use orizon_registry::{FileSignatureStore, RegistryStore};
use orizon_signing::NullScanner;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "orizon", about = "Orizon package manager", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Registry base URL or local path (defaults to ORIZON_REGISTRY or `.orizon/registry`)
    #[arg(long, global = true)]
    pub registry: Option<String>,

    /// Bearer token presented to the registry (defaults to ORIZON_REGISTRY_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a manifest in the current directory if one doesn't exist
    Init,
    /// Add a dependency: `--dep name@constraint`
    Add {
        #[arg(long = "dep")]
        dep: String,
    },
    /// Remove a dependency
    Remove {
        #[arg(long = "dep")]
        dep: String,
        /// Also remove its pinned entry from the lockfile
        #[arg(long)]
        lock: bool,
    },
    /// Resolve the manifest's dependencies and print the resolution as JSON
    Resolve,
    /// Resolve and write `orizon.lock`
    Lock,
    /// Verify `orizon.lock` against the registry
    Verify,
    /// Publish a blob to the registry
    Publish {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Fetch a single package by `name@constraint`
    Fetch { target: String },
    /// Print the dependency graph
    Graph {
        #[arg(long)]
        dot: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Explain why a package is in the resolution
    Why {
        #[arg(short, long)]
        verbose: bool,
        #[arg(long)]
        cid: bool,
        name: String,
    },
    /// Show packages with a newer version available
    Outdated,
    /// Fetch every locked package into a local vendor directory
    Vendor,
    /// Sign a published blob's descriptor with this workspace's identity
    Sign {
        #[arg(long)]
        cid: String,
        #[arg(long)]
        subject: String,
    },
    /// Verify a published blob's signature bundles
    VerifySig {
        #[arg(long)]
        cid: String,
    },
    /// Run the HTTP registry server
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
        #[arg(long, value_enum, default_value = "write")]
        auth_mode: ServeAuthMode,
        #[arg(long)]
        tls_cert: Option<String>,
        #[arg(long)]
        tls_key: Option<String>,
    },
}

#[derive(Clone, clap::ValueEnum)]
pub enum ServeAuthMode {
    Write,
    Readwrite,
}

/// Exit code categories per spec §7: `0` success, `1` runtime error, `2`
/// invalid usage.
pub enum Outcome {
    Success,
    Runtime(String),
    Usage(String),
}

pub async fn run(cli: Cli) -> Outcome {
    let workspace = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    let spec = registry_spec(cli.registry);
    let token = registry_token(cli.token, &workspace, &spec);
    let cancel = CancellationToken::new();

    match cli.command {
        Command::Init => cmd_init(&workspace),
        Command::Add { dep } => cmd_add(&workspace, &dep),
        Command::Remove { dep, lock } => cmd_remove(&workspace, &dep, lock, &spec, token, &cancel).await,
        Command::Resolve => cmd_resolve(&workspace, &spec, token, &cancel).await,
        Command::Lock => cmd_lock(&workspace, &spec, token, &cancel).await,
        Command::Verify => cmd_verify(&workspace, &spec, token, &cancel).await,
        Command::Publish { name, version, file } => cmd_publish(&name, &version, &file, &spec, token, &cancel).await,
        Command::Fetch { target } => cmd_fetch(&target, &spec, token, &cancel).await,
        Command::Graph { dot, output } => cmd_graph(&workspace, dot, output, &spec, token, &cancel).await,
        Command::Why { verbose, cid, name } => cmd_why(&workspace, verbose, cid, &name, &spec, token, &cancel).await,
        Command::Outdated => cmd_outdated(&workspace, &spec, token, &cancel).await,
        Command::Vendor => cmd_vendor(&workspace, &spec, token, &cancel).await,
        Command::Sign { cid, subject } => cmd_sign(&workspace, &cid, &subject, &spec, token, &cancel).await,
        Command::VerifySig { cid } => cmd_verify_sig(&workspace, &cid, &spec, token, &cancel).await,
        Command::Serve {
            addr,
            auth_mode,
            tls_cert,
            tls_key,
        } => cmd_serve(&addr, &spec, token, auth_mode, tls_cert, tls_key).await,
    }
}

fn cmd_init(workspace: &std::path::Path) -> Outcome {
    if Manifest::exists(workspace) {
        println!("{} manifest already exists", colors::gray("·"));
        return Outcome::Success;
    }
    match Manifest::default().save(workspace) {
        Ok(()) => {
            println!("{} created {}", colors::green("✓"), crate::manifest::MANIFEST_FILE);
            Outcome::Success
        }
        Err(e) => Outcome::Runtime(e.to_string()),
    }
}

/// Parse `name@constraint`, defaulting the constraint to `""` (accept
/// any version) when no `@` is present.
fn parse_name_constraint(spec: &str) -> Result<(PackageId, String), String> {
    let (name, constraint) = match spec.split_once('@') {
        Some((n, c)) => (n, c.to_string()),
        None => (spec, String::new()),
    };
    let pkg = PackageId::new(name).map_err(|e| e.to_string())?;
    Constraint::parse(&constraint).map_err(|e| e.to_string())?;
    Ok((pkg, constraint))
}

fn cmd_add(workspace: &std::path::Path, dep: &str) -> Outcome {
    let (name, constraint) = match parse_name_constraint(dep) {
        Ok(pair) => pair,
        Err(e) => return Outcome::Usage(format!("invalid --dep '{}': {}", dep, e)),
    };
    let mut manifest = match Manifest::load(workspace) {
        Ok(m) => m,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    manifest.dependencies.insert(name.to_string(), constraint);
    match manifest.save(workspace) {
        Ok(()) => {
            println!("{} added {}", colors::green("✓"), name);
            Outcome::Success
        }
        Err(e) => Outcome::Runtime(e.to_string()),
    }
}

async fn cmd_remove(
    workspace: &std::path::Path,
    dep: &str,
    lock: bool,
    spec: &str,
    token: Option<String>,
    cancel: &CancellationToken,
) -> Outcome {
    let name = match PackageId::new(dep) {
        Ok(n) => n,
        Err(e) => return Outcome::Usage(format!("invalid --dep '{}': {}", dep, e)),
    };
    let mut manifest = match Manifest::load(workspace) {
        Ok(m) => m,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    if manifest.dependencies.remove(name.as_str()).is_none() {
        return Outcome::Usage(format!("no such dependency: {}", name));
    }
    if let Err(e) = manifest.save(workspace) {
        return Outcome::Runtime(e.to_string());
    }

    if lock {
        let registry = match open_registry(spec, token) {
            Ok(r) => r,
            Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
        };
        match manifest.roots() {
            Ok(roots) => match resolve_and_write_lock(workspace, registry, &roots, cancel).await {
                Ok(()) => {}
                Err(e) => return Outcome::Runtime(e),
            },
            Err(e) => return Outcome::Runtime(e.to_string()),
        }
    }

    println!("{} removed {}", colors::green("✓"), name);
    Outcome::Success
}

async fn resolve_and_write_lock(
    workspace: &std::path::Path,
    registry: Arc<dyn RegistryStore>,
    roots: &[(PackageId, Constraint)],
    cancel: &CancellationToken,
) -> Result<(), String> {
    let resolution = orizon_resolver::resolve_and_fetch(registry.clone(), roots, true, cancel)
        .await
        .map_err(|e| OrizonError::from(e).one_line())?;
    let resolution: orizon_lockfile::Resolution = resolution.into_iter().map(|(name, (version, _cid))| (name, version)).collect();
    let (_lockfile, bytes) = orizon_lockfile::generate_lockfile(registry.as_ref(), &resolution, cancel)
        .await
        .map_err(|e| OrizonError::from(e).one_line())?;
    std::fs::write(workspace.join("orizon.lock"), bytes).map_err(|e| e.to_string())?;
    Ok(())
}

async fn cmd_resolve(workspace: &std::path::Path, spec: &str, token: Option<String>, cancel: &CancellationToken) -> Outcome {
    let manifest = match Manifest::load(workspace) {
        Ok(m) => m,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let roots = match manifest.roots() {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    match orizon_resolver::resolve_and_fetch(registry, &roots, true, cancel).await {
        Ok(resolution) => {
            let printable: std::collections::BTreeMap<String, String> = resolution
                .iter()
                .map(|(name, (version, cid))| (name.to_string(), format!("{}@{}", version, cid)))
                .collect();
            match serde_json::to_string_pretty(&printable) {
                Ok(json) => {
                    println!("{}", json);
                    Outcome::Success
                }
                Err(e) => Outcome::Runtime(e.to_string()),
            }
        }
        Err(e) => Outcome::Runtime(OrizonError::from(e).one_line()),
    }
}

async fn cmd_lock(workspace: &std::path::Path, spec: &str, token: Option<String>, cancel: &CancellationToken) -> Outcome {
    let manifest = match Manifest::load(workspace) {
        Ok(m) => m,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let roots = match manifest.roots() {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    match resolve_and_write_lock(workspace, registry, &roots, cancel).await {
        Ok(()) => {
            println!("{} wrote orizon.lock", colors::green("✓"));
            Outcome::Success
        }
        Err(e) => Outcome::Runtime(e),
    }
}

fn load_lockfile(workspace: &std::path::Path) -> Result<Lockfile, String> {
    let path = workspace.join("orizon.lock");
    let bytes = std::fs::read(&path).map_err(|e| format!("no lockfile: {}", e))?;
    orizon_lockfile::from_bytes(&bytes).map_err(|e| e.to_string())
}

async fn cmd_verify(workspace: &std::path::Path, spec: &str, token: Option<String>, cancel: &CancellationToken) -> Outcome {
    let lockfile = match load_lockfile(workspace) {
        Ok(lf) => lf,
        Err(e) => return Outcome::Runtime(e),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    match orizon_lockfile::verify_lockfile(registry.as_ref(), &lockfile, cancel).await {
        Ok(()) => {
            println!("{} lockfile verified ({} packages)", colors::green("✓"), lockfile.entries.len());
            Outcome::Success
        }
        Err(e) => Outcome::Runtime(OrizonError::from(e).one_line()),
    }
}

async fn cmd_publish(
    name: &str,
    version: &str,
    file: &std::path::Path,
    spec: &str,
    token: Option<String>,
    cancel: &CancellationToken,
) -> Outcome {
    let package_id = match PackageId::new(name) {
        Ok(id) => id,
        Err(e) => return Outcome::Usage(e.to_string()),
    };
    let parsed_version = match orizon_core::Version::from_str(version) {
        Ok(v) => v,
        Err(e) => return Outcome::Usage(e.to_string()),
    };
    let data = match std::fs::read(file) {
        Ok(d) => d,
        Err(e) => return Outcome::Usage(format!("cannot read {}: {}", file.display(), e)),
    };

    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };
    let manifest = orizon_core::PackageManifest::new(package_id, parsed_version);
    let blob = orizon_core::PackageBlob { manifest, data };

    match registry.publish(blob, cancel).await {
        Ok(cid) => {
            println!("{} published {}", colors::green("✓"), cid);
            Outcome::Success
        }
        Err(e) => Outcome::Runtime(OrizonError::from(e).one_line()),
    }
}

async fn cmd_fetch(target: &str, spec: &str, token: Option<String>, cancel: &CancellationToken) -> Outcome {
    let (name, constraint_text) = match parse_name_constraint(target) {
        Ok(pair) => pair,
        Err(e) => return Outcome::Usage(format!("invalid target '{}': {}", target, e)),
    };
    let constraint = Constraint::parse(&constraint_text).expect("already validated by parse_name_constraint");

    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    match registry.find(&name, Some(&constraint), cancel).await {
        Ok((cid, manifest)) => match registry.fetch(&cid, cancel).await {
            Ok(blob) => {
                println!(
                    "{} {}@{} ({} bytes, {})",
                    colors::green("✓"),
                    manifest.name,
                    manifest.version,
                    blob.data.len(),
                    cid
                );
                Outcome::Success
            }
            Err(e) => Outcome::Runtime(OrizonError::from(e).one_line()),
        },
        Err(e) => Outcome::Runtime(OrizonError::from(e).one_line()),
    }
}

async fn cmd_graph(
    workspace: &std::path::Path,
    dot: bool,
    output: Option<PathBuf>,
    spec: &str,
    token: Option<String>,
    cancel: &CancellationToken,
) -> Outcome {
    let manifest = match Manifest::load(workspace) {
        Ok(m) => m,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let roots = match manifest.roots() {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    let resolution = match orizon_resolver::resolve_and_fetch(registry.clone(), &roots, true, cancel).await {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    let rendered = if dot {
        render_dot(&resolution)
    } else {
        resolution
            .iter()
            .map(|(name, (version, _cid))| format!("{} {}", name, version))
            .collect::<Vec<_>>()
            .join("\n")
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                return Outcome::Runtime(e.to_string());
            }
        }
        None => println!("{}", rendered),
    }
    Outcome::Success
}

fn render_dot(resolution: &std::collections::BTreeMap<PackageId, (orizon_core::Version, orizon_core::Cid)>) -> String {
    let mut out = String::from("digraph orizon {\n");
    for (name, (version, _cid)) in resolution {
        out.push_str(&format!("  \"{}\" [label=\"{}@{}\"];\n", name, name, version));
    }
    out.push_str("}\n");
    out
}

async fn cmd_why(
    workspace: &std::path::Path,
    verbose: bool,
    show_cid: bool,
    name: &str,
    spec: &str,
    token: Option<String>,
    cancel: &CancellationToken,
) -> Outcome {
    let package_id = match PackageId::new(name) {
        Ok(id) => id,
        Err(e) => return Outcome::Usage(e.to_string()),
    };
    let manifest = match Manifest::load(workspace) {
        Ok(m) => m,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let roots = match manifest.roots() {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    let resolution = match orizon_resolver::resolve_and_fetch(registry, &roots, true, cancel).await {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    match resolution.get(&package_id) {
        Some((version, cid)) => {
            print!("{} {}@{}", colors::green("✓"), package_id, version);
            if show_cid {
                print!(" ({})", cid);
            }
            println!();
            if verbose {
                for (root_name, root_constraint) in &roots {
                    println!("  required by root: {} {}", root_name, root_constraint);
                }
            }
            Outcome::Success
        }
        None => {
            println!("{} {} is not in the resolution", colors::yellow("·"), package_id);
            Outcome::Success
        }
    }
}

async fn cmd_outdated(workspace: &std::path::Path, spec: &str, token: Option<String>, cancel: &CancellationToken) -> Outcome {
    let lockfile = match load_lockfile(workspace) {
        Ok(lf) => lf,
        Err(e) => return Outcome::Runtime(e),
    };
    let manifest = match Manifest::load(workspace) {
        Ok(m) => m,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let roots = match manifest.roots() {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    let fresh_resolution = match orizon_resolver::resolve_and_fetch(registry.clone(), &roots, true, cancel).await {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };
    let fresh: orizon_lockfile::Resolution = fresh_resolution.into_iter().map(|(n, (v, _c))| (n, v)).collect();
    let (fresh_lockfile, _) = match orizon_lockfile::generate_lockfile(registry.as_ref(), &fresh, cancel).await {
        Ok(lf) => lf,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    let diff = orizon_lockfile::diff(&lockfile, &fresh_lockfile);
    if diff.is_empty() {
        println!("{} everything up to date", colors::green("✓"));
    } else {
        for change in &diff.changed {
            println!("{} {} {} -> {}", colors::yellow("·"), change.name, change.old_version, change.new_version);
        }
        for entry in &diff.added {
            println!("{} {} {} (new)", colors::cyan("+"), entry.name, entry.version);
        }
        for entry in &diff.removed {
            println!("{} {} {} (no longer required)", colors::red("-"), entry.name, entry.version);
        }
    }
    Outcome::Success
}

async fn cmd_vendor(workspace: &std::path::Path, spec: &str, token: Option<String>, cancel: &CancellationToken) -> Outcome {
    let lockfile = match load_lockfile(workspace) {
        Ok(lf) => lf,
        Err(e) => return Outcome::Runtime(e),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };

    let vendor_dir = workspace.join("vendor");
    if let Err(e) = std::fs::create_dir_all(&vendor_dir) {
        return Outcome::Runtime(e.to_string());
    }

    for entry in &lockfile.entries {
        let blob = match registry.fetch(&entry.cid, cancel).await {
            Ok(b) => b,
            Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
        };
        let path = vendor_dir.join(format!("{}-{}.blob", entry.name.as_str().replace('/', "_"), entry.version));
        if let Err(e) = std::fs::write(&path, &blob.data) {
            return Outcome::Runtime(e.to_string());
        }
    }
    println!("{} vendored {} packages", colors::green("✓"), lockfile.entries.len());
    Outcome::Success
}

fn signature_store(spec: &str) -> Result<FileSignatureStore, String> {
    if spec.starts_with("http://") || spec.starts_with("https://") {
        return Err("sign/verify-sig require a local file registry (no signature endpoints over HTTP)".to_string());
    }
    Ok(FileSignatureStore::new(std::path::Path::new(spec).join("signatures")))
}

async fn cmd_sign(
    workspace: &std::path::Path,
    cid_text: &str,
    subject: &str,
    spec: &str,
    token: Option<String>,
    cancel: &CancellationToken,
) -> Outcome {
    let cid = match orizon_core::Cid::from_str(cid_text) {
        Ok(c) => c,
        Err(e) => return Outcome::Usage(e.to_string()),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };
    let store = match signature_store(spec) {
        Ok(s) => s,
        Err(e) => return Outcome::Runtime(e),
    };

    let identity = match Identity::load_or_create(workspace, subject) {
        Ok(i) => i,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };
    if let Err(e) = identity::trust_root(workspace, &identity.root_cert) {
        return Outcome::Runtime(e.to_string());
    }

    match orizon_signing::sign_package(
        registry.as_ref(),
        &store,
        &cid,
        &identity.signing_key,
        vec![identity.root_cert.clone()],
        cancel,
    )
    .await
    {
        Ok(bundle) => {
            println!("{} signed {} with key {}", colors::green("✓"), cid, bundle.key_id);
            Outcome::Success
        }
        Err(e) => Outcome::Runtime(OrizonError::from(e).one_line()),
    }
}

async fn cmd_verify_sig(
    workspace: &std::path::Path,
    cid_text: &str,
    spec: &str,
    token: Option<String>,
    cancel: &CancellationToken,
) -> Outcome {
    let cid = match orizon_core::Cid::from_str(cid_text) {
        Ok(c) => c,
        Err(e) => return Outcome::Usage(e.to_string()),
    };
    let registry = match open_registry(spec, token) {
        Ok(r) => r,
        Err(e) => return Outcome::Runtime(OrizonError::from(e).one_line()),
    };
    let store = match signature_store(spec) {
        Ok(s) => s,
        Err(e) => return Outcome::Runtime(e),
    };
    let trust_store = match identity::load_trust_store(workspace) {
        Ok(t) => t,
        Err(e) => return Outcome::Runtime(e.to_string()),
    };

    match orizon_signing::validate_package_security(registry.as_ref(), &trust_store, &cid, &store, &NullScanner, cancel)
        .await
    {
        Ok(()) => {
            println!("{} {} verified", colors::green("✓"), cid);
            Outcome::Success
        }
        Err(e) => Outcome::Runtime(OrizonError::from(e).one_line()),
    }
}

/// Spawns the standalone `registry-server` binary, relaying the backend
/// spec and bearer token through the env vars spec §6 names plus
/// `ORIZON_REGISTRY_ADDR` for the bind address (the wire protocol table
/// has no field for it, since the spec takes the server's listen address
/// as given rather than client-supplied).
async fn cmd_serve(
    addr: &str,
    spec: &str,
    token: Option<String>,
    auth_mode: ServeAuthMode,
    tls_cert: Option<String>,
    tls_key: Option<String>,
) -> Outcome {
    let mut command = std::process::Command::new(
        std::env::var("ORIZON_REGISTRY_SERVER_BIN").unwrap_or_else(|_| "registry-server".to_string()),
    );
    command.env("ORIZON_REGISTRY_ADDR", addr);
    command.env("ORIZON_REGISTRY", spec);
    command.env("ORIZON_REGISTRY_AUTH_MODE", match auth_mode {
        ServeAuthMode::Write => "write",
        ServeAuthMode::Readwrite => "readwrite",
    });
    if let Some(token) = token {
        command.env("ORIZON_REGISTRY_TOKEN", token);
    }
    if let Some(cert) = tls_cert {
        command.env("ORIZON_REGISTRY_TLS_CERT", cert);
    }
    if let Some(key) = tls_key {
        command.env("ORIZON_REGISTRY_TLS_KEY", key);
    }

    println!("{} launching registry server on {}", colors::status_label("Serve"), addr);
    match command.status() {
        Ok(status) if status.success() => Outcome::Success,
        Ok(status) => Outcome::Runtime(format!("registry server exited with {}", status)),
        Err(e) => Outcome::Runtime(format!("failed to launch registry server: {}", e)),
    }
}
