//! Tests for file discovery, package bucketing, dependency resolution
//! and the parsed-file dedup set.

mod common;

use std::fs;
use std::path::Path;

use anyhow::Result;
use inkwell::context::Context;
use tempfile::tempdir;

use geodec::package::{resolve_dep_path, search_paths};
use geodec::program::Program;

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

#[test]
fn files_parse_once_even_when_revisited() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    write(
        &root.join("main.g"),
        "is main\nfunc main() int { return 0; }\n",
    );

    let context = Context::create();
    let mut program = Program::new(&context, &root.join("main.g"));
    program.parse_path(root)?;
    program.parse_path(root)?;

    let pkg = program.packages.get("main").expect("package exists");
    assert_eq!(pkg.files.len(), 1);
    let fn_count = pkg
        .nodes
        .iter()
        .filter(|(_, n)| matches!(n, geode_ast::Item::Func(_)))
        .count();
    assert_eq!(fn_count, 1, "nodes must appear exactly once");
    Ok(())
}

#[test]
fn dependencies_are_discovered_transitively() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    write(
        &root.join("proj/main.g"),
        "is main\ninclude \"util\"\nfunc main() int { return util:one(); }\n",
    );
    write(
        &root.join("proj/util/util.g"),
        "is util\nfunc one() int { return 1; }\n",
    );

    let context = Context::create();
    let mut program = Program::new(&context, &root.join("proj/main.g"));
    program.parse_path(&root.join("proj/main.g"))?;
    program.congeal()?;

    assert!(program.packages.contains_key("util"));
    let ir = program.to_ir();
    assert!(
        ir.contains("define i32 @util_one"),
        "expected the dependency's function:\n{}",
        ir
    );
    Ok(())
}

#[test]
fn include_cycles_terminate_via_the_dedup_set() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    write(
        &root.join("a/a.g"),
        "is a\ninclude \"../b\"\nfunc main() int { return 0; }\n",
    );
    write(&root.join("b/b.g"), "is b\ninclude \"../a\"\n");

    let context = Context::create();
    let mut program = Program::new(&context, &root.join("a/a.g"));
    program.parse_path(&root.join("a/a.g"))?;

    assert!(program.packages.contains_key("a"));
    assert!(program.packages.contains_key("b"));
    Ok(())
}

#[test]
fn c_linkage_dependencies_skip_parsing() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    write(
        &root.join("main.g"),
        "is main\nlink \"native.c\"\nfunc main() int { return 0; }\n",
    );

    let context = Context::create();
    let mut program = Program::new(&context, &root.join("main.g"));
    program.parse_path(root)?;

    assert_eq!(program.c_linkages.len(), 1);
    assert!(program.c_linkages[0].ends_with("native.c"));
    // Nothing was recursively parsed for the C dependency.
    assert_eq!(program.packages.len(), 1);
    Ok(())
}

#[test]
fn std_dependencies_resolve_against_the_stdlib_root() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    write(
        &root.join("stdlib/io/io.g"),
        "is io\nfunc ready() int { return 1; }\n",
    );
    write(
        &root.join("proj/main.g"),
        "is main\ninclude \"std:io\"\nfunc main() int { return io:ready(); }\n",
    );

    let context = Context::create();
    let mut program = Program::new(&context, &root.join("proj/main.g"));
    program.stdlib_root = root.join("stdlib");
    program.parse_path(&root.join("proj/main.g"))?;
    program.congeal()?;

    assert!(program.packages.contains_key("io"));
    Ok(())
}

#[test]
fn plain_dependencies_prefer_the_project_subdirectory() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("proj/util")).unwrap();
    fs::create_dir_all(root.join("proj/geodepkgs/util")).unwrap();

    let resolved = resolve_dep_path(&root.join("proj"), "util", &root.join("stdlib"));
    assert_eq!(resolved, root.join("proj/util"));
}

#[test]
fn plain_dependencies_fall_back_to_geodepkgs() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("proj/geodepkgs/util")).unwrap();

    let resolved = resolve_dep_path(&root.join("proj"), "util", &root.join("stdlib"));
    assert_eq!(resolved, root.join("proj/geodepkgs/util"));
}

#[test]
fn geodepkgs_directories_are_searched_up_the_tree() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("geodepkgs/util")).unwrap();
    fs::create_dir_all(root.join("workspace/proj")).unwrap();

    let resolved = resolve_dep_path(&root.join("workspace/proj"), "util", &root.join("stdlib"));
    assert_eq!(resolved, root.join("geodepkgs/util"));
}

#[test]
fn search_paths_start_at_the_base() {
    let sp = search_paths(Path::new("/x/y"));
    assert_eq!(sp[0], Path::new("/x/y"));
    assert!(sp.iter().any(|p| p == Path::new("/x/y/geodepkgs")));
    assert!(sp.iter().any(|p| p == Path::new("/x/geodepkgs")));
}

#[test]
fn missing_namespace_declaration_is_fatal() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(&root.join("main.g"), "func main() int { return 0; }\n");

    let context = Context::create();
    let mut program = Program::new(&context, &root.join("main.g"));
    let err = program.parse_path(root).unwrap_err();
    assert!(
        format!("{}", err).contains("no namespace declaration"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn malformed_namespace_names_are_fatal() {
    let context = Context::create();
    let mut program = Program::new(&context, Path::new("bad.g"));
    let err = program
        .parse_text("is Main\nfunc main() int { return 0; }\n", Path::new("bad.g"))
        .unwrap_err();
    assert!(
        format!("{}", err).contains("invalid namespace name \"Main\""),
        "unexpected error: {}",
        err
    );
}

#[test]
fn files_of_one_namespace_share_a_package() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    write(&root.join("one.g"), "is shared\nfunc a() int { return 1; }\n");
    write(&root.join("two.g"), "is shared\nfunc b() int { return 2; }\n");

    let context = Context::create();
    let mut program = Program::new(&context, &root.join("one.g"));
    program.parse_path(root)?;

    assert_eq!(program.packages.len(), 1);
    let pkg = program.packages.get("shared").unwrap();
    assert_eq!(pkg.files.len(), 2);
    Ok(())
}

#[test]
fn unresolved_dependencies_surface_as_read_errors() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(
        &root.join("main.g"),
        "is main\ninclude \"nowhere\"\nfunc main() int { return 0; }\n",
    );

    let context = Context::create();
    let mut program = Program::new(&context, &root.join("main.g"));
    let err = program.parse_path(root).unwrap_err();
    assert!(
        format!("{:#}", err).contains("unable to read source directory"),
        "unexpected error: {:#}",
        err
    );
}
