use anyhow::Result;
use atty::Stream as AtStream;
use clap::{Parser, Subcommand};
use colored::Colorize;

use geodec::{CompileOptions, compile};

#[derive(Parser)]
#[command(name = "geode", about = "Geode: compile .g sources to LLVM IR")]
struct Cli {
    /// Print extra information about the build
    #[arg(long = "verbose")]
    verbose: bool,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an entry file or project directory to textual IR
    Build {
        /// Path to the entry `.g` file or project directory
        path: String,

        /// Output directory for the emitted IR (defaults to ./build)
        #[arg(short = 'o', long = "build-dir")]
        build_dir: Option<String>,

        /// Attach scope and return-location metadata to the module
        #[arg(long)]
        debug: bool,

        /// Target triple to stamp into the emitted module
        #[arg(long = "target-triple")]
        target_triple: Option<String>,

        /// Standard library root (overrides GEODE_STDLIB)
        #[arg(long = "stdlib")]
        stdlib: Option<String>,

        /// Suppress progress output
        #[arg(long = "quiet")]
        quiet: bool,
    },
}

fn main() {
    // Only color output that lands on a terminal.
    if !atty::is(AtStream::Stderr) {
        colored::control::set_override(false);
    }

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.cmd {
        Commands::Build {
            path,
            build_dir,
            debug,
            target_triple,
            stdlib,
            quiet,
        } => {
            let options = CompileOptions {
                entry: path.clone(),
                build_dir,
                debug,
                target_triple,
                stdlib_root: stdlib,
            };
            let output = compile(&options)?;
            if !quiet {
                eprintln!(
                    "{} {} -> {}",
                    "Compiled".green().bold(),
                    path,
                    output.ir_path.display()
                );
            }
            if cli.verbose && !output.c_linkages.is_empty() {
                eprintln!("{}", "native dependencies:".bold());
                for dep in &output.c_linkages {
                    eprintln!("  {}", dep.display());
                }
            }
            Ok(())
        }
    }
}
