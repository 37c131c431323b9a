//! pyxforge CLI - compile Python source trees into native extension modules.

mod build;
mod clean;
mod colors;
mod library;
mod reporter;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pyxforge")]
#[command(about = "Compile Python source trees into native extension modules with Cython")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform and compile a source tree in place
    Build {
        /// Directory holding the Python sources
        target: String,

        /// Output directory
        #[arg(short, long, default_value = pyxforge_core::paths::DEFAULT_OUTPUT_DIR)]
        output: String,

        /// Build a wheel from the output and install it
        #[arg(short, long)]
        install: bool,

        /// Package version used with --install
        #[arg(long, default_value = pyxforge_core::package::DEFAULT_VERSION)]
        pkg_version: String,

        /// Skip loop/function comment annotations
        #[arg(long)]
        no_annotate: bool,

        /// Skip the missing-import check
        #[arg(long)]
        no_import_check: bool,

        /// Worker count (default: logical processors)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Compile an installed library and reinstall it
    Lib {
        /// Import name of the library
        name: String,
    },

    /// Remove build outputs, caches and stray extension files
    Clean {
        /// Output directory to remove
        #[arg(default_value = pyxforge_core::paths::DEFAULT_OUTPUT_DIR)]
        output: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Attach recovery hints to core errors
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<pyxforge_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Build {
            target,
            output,
            install,
            pkg_version,
            no_annotate,
            no_import_check,
            jobs,
        } => {
            let args = build::BuildArgs {
                target: &target,
                output: &output,
                install,
                pkg_version: &pkg_version,
                annotate: !no_annotate,
                check_imports: !no_import_check,
                jobs,
            };
            build::execute(&args).map_err(format_error)?;
        }

        Commands::Lib { name } => library::execute(&name).map_err(format_error)?,

        Commands::Clean { output } => clean::execute(&output).map_err(format_error)?,
    }

    Ok(())
}
