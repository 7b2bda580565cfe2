//! The Geode compiler.
//!
//! Geode sources are discovered from an entry path, parsed into
//! packages, resolved across namespaces, and lowered on demand into an
//! LLVM module that is written out as textual IR.
//!
//! [`compile`] is the programmatic entry point; the `geode` binary is a
//! thin CLI over it.

pub mod codegen;
pub mod diagnostics;
pub mod package;
pub mod program;
pub mod scope;
pub mod types;

use std::path::{Path, PathBuf};

use inkwell::context::Context;

use program::Program;

/// Compilation options for the Geode compiler.
///
/// Separates compiler configuration from CLI argument parsing; the
/// compiler accepts explicit options rather than discovering them.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Entry path: a `.g` file or a project directory.
    pub entry: String,

    /// Directory the textual IR is written under. Defaults to `build`.
    pub build_dir: Option<String>,

    /// Enables the named-metadata debug side channel.
    pub debug: bool,

    /// Target triple override; defaults to the host triple.
    pub target_triple: Option<String>,

    /// Standard library root override; defaults to the `GEODE_STDLIB`
    /// environment variable or the system location.
    pub stdlib_root: Option<String>,
}

impl CompileOptions {
    pub fn new(entry: impl Into<String>) -> Self {
        CompileOptions {
            entry: entry.into(),
            build_dir: None,
            debug: false,
            target_triple: None,
            stdlib_root: None,
        }
    }
}

/// The result of a compilation: where the IR landed plus the native
/// dependencies a later link step would need.
#[derive(Debug)]
pub struct CompileOutput {
    pub ir_path: PathBuf,
    pub c_linkages: Vec<PathBuf>,
}

/// Compiles an entry path to a textual IR file.
///
/// Drives the full pipeline: discover and parse sources, declare and
/// lower classes and globals, lower `main` (pulling everything it
/// reaches), and emit the module.
pub fn compile(options: &CompileOptions) -> anyhow::Result<CompileOutput> {
    let entry = Path::new(&options.entry);
    let context = Context::create();
    let mut program = Program::new(&context, entry);
    program.debug = options.debug;
    if let Some(triple) = &options.target_triple {
        program.target_triple = triple.clone();
    }
    if let Some(root) = &options.stdlib_root {
        program.stdlib_root = PathBuf::from(root);
    }

    program.parse_path(entry)?;
    program.congeal()?;

    let build_dir = options.build_dir.clone().unwrap_or_else(|| "build".to_string());
    let ir_path = program.emit(Path::new(&build_dir))?;
    Ok(CompileOutput {
        ir_path,
        c_linkages: program.c_linkages.clone(),
    })
}
