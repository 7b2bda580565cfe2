use anyhow::Result;

use geodec::program::Program;
use inkwell::context::Context;
use std::path::Path;

/// Compiles a single in-memory source file and returns the textual IR.
///
/// Diagnostics are suppressed so failing compilations only surface
/// through the returned error.
#[allow(dead_code)]
pub fn compile_to_ir(src: &str) -> Result<String> {
    let _guard = geodec::diagnostics::suppress();
    let context = Context::create();
    let mut program = Program::new(&context, Path::new("test.g"));
    program.parse_text(src, Path::new("test.g"))?;
    program.congeal()?;
    Ok(program.to_ir())
}

/// Like [`compile_to_ir`] but with the debug side channel enabled.
#[allow(dead_code)]
pub fn compile_to_ir_debug(src: &str) -> Result<String> {
    let _guard = geodec::diagnostics::suppress();
    let context = Context::create();
    let mut program = Program::new(&context, Path::new("test.g"));
    program.debug = true;
    program.parse_text(src, Path::new("test.g"))?;
    program.congeal()?;
    Ok(program.to_ir())
}

/// Compiles a source string and hands the finished program to the
/// callback, for tests that inspect registries or the module itself.
#[allow(dead_code)]
pub fn with_compiled_program<T>(
    src: &str,
    f: impl FnOnce(&mut Program) -> T,
) -> Result<T> {
    let _guard = geodec::diagnostics::suppress();
    let context = Context::create();
    let mut program = Program::new(&context, Path::new("test.g"));
    program.parse_text(src, Path::new("test.g"))?;
    program.congeal()?;
    Ok(f(&mut program))
}
