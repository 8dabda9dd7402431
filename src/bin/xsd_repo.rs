//! XSD Repository CLI
//!
//! Resolve qualified names, print type hierarchies, bundle schema sets and
//! report conflicts between packages.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use xsd_repository::graph::{to_mermaid, to_text, DerivationGraph};
use xsd_repository::package::PackageStore;
use xsd_repository::{
    detect_conflicts, DirectoryStore, FileSystemSource, HierarchyAnalyzer, Loader, MergeResolver, PackageSource,
    PackageSpec, Repository, RepositoryConfig, SchemaCache,
};

#[derive(Parser)]
#[command(name = "xsd-repo")]
#[command(about = "Inspect XSD schema repositories and packages")]
struct Cli {
    /// Configuration file (overrides xsd-repository.toml discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve qualified names against the loaded schemas
    Resolve {
        /// Entry schema files or directories
        #[arg(short, long, required = true)]
        schema: Vec<PathBuf>,
        /// `prefix:Local`, `{uri}Local` or a bare local name
        #[arg(required = true)]
        names: Vec<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show ancestors and descendants of a type
    Hierarchy {
        #[arg(short, long, required = true)]
        schema: Vec<PathBuf>,
        /// Type to analyze
        name: String,
        /// Descendant depth (defaults to hierarchy.default_depth)
        #[arg(short, long)]
        depth: Option<usize>,
        #[arg(short, long, value_enum, default_value_t = HierarchyFormat::Text)]
        format: HierarchyFormat,
    },

    /// Write the loaded schemas as a package bundle
    Bundle {
        #[arg(short, long, required = true)]
        schema: Vec<PathBuf>,
        /// Bundle directory to create
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Report conflicts between packages, optionally merging them
    Conflicts {
        /// Bundle paths, or JSON package objects
        #[arg(required = true)]
        packages: Vec<String>,
        #[arg(long)]
        json: bool,
        /// Also run the merge and print its summary
        #[arg(long)]
        merge: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HierarchyFormat {
    Text,
    Mermaid,
    Dot,
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref().map(|p| p.to_string_lossy().into_owned());
    let config = RepositoryConfig::load_from(config_path.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Resolve { schema, names, json } => {
            let repository = load(&schema, &config)?;
            let results = repository.resolve_batch(&names);

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for entry in &results {
                    match (entry.result.resolved(), entry.result.failure()) {
                        (Some(found), _) => println!(
                            "✅ {} -> {} {} ({})",
                            entry.query, found.category, found.qualified_name, found.schema_location
                        ),
                        (None, Some(failure)) => {
                            println!("❌ {}: {}", entry.query, failure.message);
                            if !failure.suggestions.is_empty() {
                                println!("   did you mean: {}", failure.suggestions.join(", "));
                            }
                        }
                        (None, None) => {}
                    }
                }
            }

            if results.iter().any(|r| !r.result.is_resolved()) {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Hierarchy {
            schema,
            name,
            depth,
            format,
        } => {
            let repository = load(&schema, &config)?;

            if let HierarchyFormat::Dot = format {
                print!("{}", DerivationGraph::build(&repository).to_dot());
                return Ok(());
            }

            let analyzer = HierarchyAnalyzer::with_config(&repository, &config.hierarchy);
            let node = match depth {
                Some(depth) => analyzer.analyze(&name, depth),
                None => analyzer.analyze_default(&name),
            };
            let Some(node) = node else {
                bail!("type '{}' not found", name);
            };

            match format {
                HierarchyFormat::Text => print!("{}", to_text(&node)),
                HierarchyFormat::Mermaid => println!("{}", to_mermaid(&node)),
                HierarchyFormat::Json => println!("{}", serde_json::to_string_pretty(&node)?),
                HierarchyFormat::Dot => {}
            }
            Ok(())
        }

        Commands::Bundle { schema, output, name } => {
            let repository = load(&schema, &config)?;
            let bundle = repository.to_bundle(name.as_deref())?;
            DirectoryStore
                .write_bundle(&output, &bundle)
                .with_context(|| format!("failed to write bundle to {}", output.display()))?;
            println!(
                "✅ Wrote {} schema file(s), {} index entries to {}",
                bundle.files.len(),
                bundle.index.len(),
                output.display()
            );
            Ok(())
        }

        Commands::Conflicts { packages, json, merge } => {
            let specs = packages
                .iter()
                .map(|arg| parse_package_arg(arg))
                .collect::<Result<Vec<_>>>()?;

            let report = detect_conflicts(&specs, &DirectoryStore, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }

            if merge {
                let sources = specs
                    .iter()
                    .map(|spec| PackageSource::load(spec, &DirectoryStore, &config))
                    .collect::<xsd_repository::Result<Vec<_>>>()?;
                let merged = MergeResolver::new(config.merge.clone()).merge(&sources)?;
                let stats = merged.statistics();
                println!(
                    "\n✅ Merged {} package(s): {} declaration(s) in {} namespace(s)",
                    sources.len(),
                    stats.declarations,
                    stats.namespaces
                );
            }
            Ok(())
        }
    }
}

/// Bundle path, or a JSON object when the argument starts with `{`
fn parse_package_arg(arg: &str) -> Result<PackageSpec> {
    if arg.trim_start().starts_with('{') {
        let value: serde_json::Value =
            serde_json::from_str(arg).with_context(|| format!("invalid package JSON: {}", arg))?;
        return Ok(PackageSpec::from_value(value)?);
    }
    Ok(PackageSpec::from(arg))
}

fn load(paths: &[PathBuf], config: &RepositoryConfig) -> Result<Repository> {
    let source = FileSystemSource;
    let loader = Loader::from_config(&source, config)?;
    let mut cache = SchemaCache::new();

    let repository = match paths {
        [dir] if dir.is_dir() => loader.load_directory(dir, &mut cache)?,
        _ => {
            let entries: Vec<String> = paths.iter().map(|p| path_str(p)).collect();
            loader.load(&entries, &mut cache)?
        }
    };

    let diagnostics = repository.diagnostics();
    if !diagnostics.is_empty() {
        eprint!("{}", diagnostics.format_all());
    }
    Ok(repository)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
