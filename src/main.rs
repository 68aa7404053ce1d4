//! releng-sign CLI
//!
//! Entry point for the `releng-sign` command-line tool.

use std::fmt::Display;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use releng_sign::config::{Environment, Release, SearchPath, SigningLevel, DEFAULT_ENVIRONMENT};
use releng_sign::request::{PackageSource, SigningRequest};
use releng_sign::service::{BuildService, LocalBuildService};
use releng_sign::sign::{ReconcileOptions, Reconciler, SignerRegistry};
use releng_sign::SigKeys;

#[derive(Parser)]
#[command(name = "releng-sign")]
#[command(about = "Bring RPMs in a build service to a signed state", version)]
struct Cli {
    /// Log per-package decisions
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign the latest RPMs in a release's tag
    Release {
        /// Release ID, e.g. 'fedora-40'
        release_id: String,

        /// Signature level: beta or gold
        level: SigningLevel,

        /// Restrict to these source packages
        #[arg(long = "package")]
        packages: Vec<String>,

        #[command(flatten)]
        pass: PassArgs,
    },

    /// Sign the RPMs of explicit builds
    Builds {
        /// Builds as name-version-release
        #[arg(required = true)]
        nvrs: Vec<String>,

        /// Accepted keys, highest priority first
        #[arg(long = "key", required = true)]
        keys: Vec<String>,

        #[command(flatten)]
        pass: PassArgs,
    },

    /// Sign the RPMs of builds tagged into a tag
    Tag {
        tag: String,

        /// Accepted keys, highest priority first
        #[arg(long = "key", required = true)]
        keys: Vec<String>,

        /// All tagged builds instead of the latest per package
        #[arg(long)]
        all: bool,

        /// Follow tag inheritance
        #[arg(long)]
        inherit: bool,

        #[command(flatten)]
        pass: PassArgs,
    },

    /// Show which RPMs in a tag have a signed copy, without changing anything
    Classify {
        tag: String,

        #[arg(long = "key", required = true)]
        keys: Vec<String>,

        #[arg(long)]
        inherit: bool,

        #[command(flatten)]
        env: EnvArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct EnvArgs {
    /// Environment to work in
    #[arg(long = "env", default_value = DEFAULT_ENVIRONMENT)]
    name: String,

    /// Search only this directory for descriptors
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[derive(Args)]
struct PassArgs {
    /// Just sign RPMs, don't write RPMs from sigcache
    #[arg(long, conflicts_with = "just_write")]
    just_sign: bool,

    /// Just write RPMs from sigcache, don't sign anything
    #[arg(long)]
    just_write: bool,

    /// Apply changes; the default is a dry run
    #[arg(long)]
    commit: bool,

    #[command(flatten)]
    env: EnvArgs,

    /// Print the reconciliation report as JSON
    #[arg(long)]
    json: bool,
}

impl PassArgs {
    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            just_sign: self.just_sign,
            just_write: self.just_write,
            commit: self.commit,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Release {
            release_id,
            level,
            packages,
            pass,
        } => {
            run_release(&release_id, level, packages, pass);
        }
        Commands::Builds { nvrs, keys, pass } => {
            run_sources(PackageSource::Builds(nvrs), keys, pass);
        }
        Commands::Tag {
            tag,
            keys,
            all,
            inherit,
            pass,
        } => {
            let source = PackageSource::Tag {
                tag,
                latest: !all,
                inherit,
            };
            run_sources(source, keys, pass);
        }
        Commands::Classify {
            tag,
            keys,
            inherit,
            env,
            json,
        } => {
            run_classify(&tag, keys, inherit, env, json);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn or_exit<T, E: Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{}: {}", context, e);
            process::exit(1);
        }
    }
}

fn load_environment(args: &EnvArgs) -> (SearchPath, Environment) {
    let search = SearchPath::resolve(args.config_dir.as_deref());
    let env = or_exit(Environment::load(&args.name, &search), "Configuration error");
    (search, env)
}

fn parse_keys(keys: Vec<String>) -> SigKeys {
    or_exit(SigKeys::new(keys), "Invalid --key")
}

fn run_release(release_id: &str, level: SigningLevel, packages: Vec<String>, pass: PassArgs) {
    let (search, env) = load_environment(&pass.env);
    let release = or_exit(Release::load(release_id, &search), "Configuration error");
    let request = or_exit(
        SigningRequest::for_release(&env, &release, level, packages, pass.options()),
        "Configuration error",
    );
    execute(&env, &request, pass.json);
}

fn run_sources(source: PackageSource, keys: Vec<String>, pass: PassArgs) {
    let (_, env) = load_environment(&pass.env);
    let request = SigningRequest::new(&env, source, parse_keys(keys), pass.options());
    execute(&env, &request, pass.json);
}

fn open_service(env: &Environment) -> LocalBuildService {
    let service = or_exit(LocalBuildService::open(&env.config.topdir), "Cannot open build service");
    let service = service.with_auth(env.config.auth);
    or_exit(service.login(), "Login failed");
    service
}

fn execute(env: &Environment, request: &SigningRequest, json: bool) {
    for line in request.details() {
        info!("{}", line);
    }

    let signer = or_exit(
        SignerRegistry::with_builtins().resolve(&request.signer, &env.signer_context()),
        "Configuration error",
    );
    let service = open_service(env);
    let reconciler = or_exit(
        Reconciler::new(&service, signer).and_then(|r| r.with_parallelism(env.config.signing.parallelism)),
        "Setup failed",
    )
    .with_limits(env.config.signing.batch_limits());

    info!("Reading RPM information");
    let rpms = or_exit(request.collect(&service), "Listing RPMs failed");
    let report = or_exit(
        reconciler.reconcile(&rpms, &request.keys, request.options),
        "Signing failed",
    );

    if json {
        println!("{}", or_exit(report.to_json(), "Error serializing report"));
    } else {
        for line in report.summary_lines() {
            println!("{}", line);
        }
    }
}

fn run_classify(tag: &str, keys: Vec<String>, inherit: bool, args: EnvArgs, json: bool) {
    let (_, env) = load_environment(&args);
    let keys = parse_keys(keys);
    let service = open_service(&env);
    let rpms = or_exit(service.list_tagged_rpms(tag, true, inherit), "Listing RPMs failed");

    let signer = or_exit(
        SignerRegistry::with_builtins().resolve(&env.config.signer, &env.signer_context()),
        "Configuration error",
    );
    let reconciler = or_exit(
        Reconciler::new(&service, signer).and_then(|r| r.with_parallelism(env.config.signing.parallelism)),
        "Setup failed",
    );
    let (signed, unsigned) = reconciler.classify(&rpms, &keys);

    if json {
        let output = serde_json::json!({
            "tag": tag,
            "keys": keys,
            "signed": signed.iter().map(|r| r.nvra()).collect::<Vec<_>>(),
            "unsigned": unsigned.iter().map(|r| r.nvra()).collect::<Vec<_>>(),
        });
        println!("{}", or_exit(serde_json::to_string_pretty(&output), "Error serializing output"));
    } else {
        println!("Signed ({}):", signed.len());
        for rpm in &signed {
            println!("  {}", rpm.nvra());
        }
        println!("Unsigned ({}):", unsigned.len());
        for rpm in &unsigned {
            println!("  {}", rpm.nvra());
        }
    }
}
