//! Integration tests for tree assembly
//!
//! - Files keep contents, mode and modification time
//! - Symlinks are reproduced only when they stay in their directory
//! - Existing destinations are left alone unless overwrite is on
//! - Exclusion sweep spares protected paths; broken links are pruned
//! - Resume removes interrupted copies; fresh moves the old tree aside
//!
//! **Property: Placing the same files twice performs no writes**

use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use portroot::config::settings::{ExcludeConfig, RulesConfig};
use portroot::core::classify::BuildProfile;
use portroot::core::rules::{ClassificationRuleSet, RuleUsage};
use portroot::error::AssemblyError;
use portroot::infra::tree::{Placement, TreeAssembler, TreeMode};
use predicates::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

fn write(child: &ChildPath, content: &str) {
    fs::create_dir_all(child.path().parent().unwrap()).unwrap();
    child.write_str(content).unwrap();
}

fn link(child: &ChildPath, target: impl AsRef<Path>) {
    fs::create_dir_all(child.path().parent().unwrap()).unwrap();
    child.symlink_to_file(target.as_ref()).unwrap();
}

fn open(root: &Path, mode: TreeMode, overwrite: bool) -> TreeAssembler {
    TreeAssembler::open(root, mode, overwrite).expect("open tree")
}

#[test]
fn test_file_keeps_contents_mode_and_mtime() {
    let temp = assert_fs::TempDir::new().unwrap();
    let source = temp.child("host/bin/tool");
    write(&source, "#!/bin/sh\necho hi\n");
    fs::set_permissions(source.path(), fs::Permissions::from_mode(0o750)).unwrap();
    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    fs::File::options()
        .write(true)
        .open(source.path())
        .unwrap()
        .set_modified(mtime)
        .unwrap();

    let image = temp.child("image");
    let mut tree = open(image.path(), TreeMode::Fresh, false);
    let placement = tree.add(source.path(), Path::new("bin/tool")).unwrap();

    assert_eq!(placement, Placement::Written);
    let placed = image.child("bin/tool");
    placed.assert("#!/bin/sh\necho hi\n");
    let metadata = fs::metadata(placed.path()).unwrap();
    assert_eq!(metadata.permissions().mode() & 0o7777, 0o750);
    assert_eq!(metadata.modified().unwrap(), mtime);
    image
        .child("bin/.tool.portroot-partial")
        .assert(predicate::path::missing());
}

#[test]
fn test_existing_destination_untouched_without_overwrite() {
    let temp = assert_fs::TempDir::new().unwrap();
    let source = temp.child("host/lib64/libz.so.1");
    write(&source, "new");
    let image = temp.child("image");
    write(&image.child("lib64/libz.so.1"), "old");

    let mut tree = open(image.path(), TreeMode::Resume, false);
    let placement = tree.add(source.path(), Path::new("lib64/libz.so.1")).unwrap();

    assert_eq!(placement, Placement::AlreadyPresent);
    assert_eq!(tree.writes(), 0);
    image.child("lib64/libz.so.1").assert("old");
}

#[test]
fn test_overwrite_replaces_destination() {
    let temp = assert_fs::TempDir::new().unwrap();
    let source = temp.child("host/lib64/libz.so.1");
    write(&source, "new");
    let image = temp.child("image");
    write(&image.child("lib64/libz.so.1"), "old");

    let mut tree = open(image.path(), TreeMode::Resume, true);
    tree.add(source.path(), Path::new("lib64/libz.so.1")).unwrap();

    image.child("lib64/libz.so.1").assert("new");
    assert_eq!(tree.writes(), 1);
}

#[test]
fn test_missing_source_is_reported() {
    let temp = assert_fs::TempDir::new().unwrap();
    let image = temp.child("image");
    let mut tree = open(image.path(), TreeMode::Fresh, false);

    let placement = tree
        .add(&temp.path().join("host/nothing"), Path::new("lib/nothing"))
        .unwrap();
    assert_eq!(placement, Placement::MissingSource);
    image.child("lib/nothing").assert(predicate::path::missing());
}

#[test]
fn test_destination_must_stay_inside_root() {
    let temp = assert_fs::TempDir::new().unwrap();
    let source = temp.child("host/file");
    write(&source, "x");
    let mut tree = open(&temp.path().join("image"), TreeMode::Fresh, false);

    for rel in ["../escape", "/etc/passwd", ""] {
        let err = tree.add(source.path(), Path::new(rel)).unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidDestination { .. }), "{rel}");
    }
}

#[test]
fn test_symlinks_in_same_directory_are_kept() {
    let temp = assert_fs::TempDir::new().unwrap();
    let lib = temp.child("host/lib64/libfoo.so.1.2");
    write(&lib, "elf");
    let bare = temp.child("host/lib64/libfoo.so.1");
    link(&bare, "libfoo.so.1.2");
    let absolute = temp.child("host/lib64/libfoo.so");
    link(&absolute, lib.path());

    let image = temp.child("image");
    let mut tree = open(image.path(), TreeMode::Fresh, false);
    tree.add(lib.path(), Path::new("lib64/libfoo.so.1.2")).unwrap();
    tree.add(bare.path(), Path::new("lib64/libfoo.so.1")).unwrap();
    tree.add(absolute.path(), Path::new("lib64/libfoo.so")).unwrap();

    assert_eq!(
        fs::read_link(image.child("lib64/libfoo.so.1").path()).unwrap(),
        PathBuf::from("libfoo.so.1.2")
    );
    assert_eq!(
        fs::read_link(image.child("lib64/libfoo.so").path()).unwrap(),
        PathBuf::from("libfoo.so.1.2")
    );
    image.child("lib64/libfoo.so").assert("elf");
}

#[test]
fn test_symlinks_leaving_their_directory_are_skipped() {
    let temp = assert_fs::TempDir::new().unwrap();
    let outside = temp.child("host/lib64/libcrypto.so");
    link(&outside, "../../opt/ssl/libcrypto.so.3");

    let image = temp.child("image");
    let mut tree = open(image.path(), TreeMode::Fresh, false);
    let placement = tree.add(outside.path(), Path::new("lib64/libcrypto.so")).unwrap();

    assert_eq!(
        placement,
        Placement::SkippedSymlink {
            target: PathBuf::from("../../opt/ssl/libcrypto.so.3")
        }
    );
    image
        .child("lib64/libcrypto.so")
        .assert(predicate::path::missing());
}

fn exclusion_rules(common: &[&str]) -> ClassificationRuleSet {
    ClassificationRuleSet::from_config(&RulesConfig {
        must_exclude: ExcludeConfig {
            common: common.iter().map(ToString::to_string).collect(),
            release: vec!["/lib64/pkgconfig".to_string()],
            debug: Vec::new(),
        },
        ..RulesConfig::default()
    })
    .unwrap()
}

#[test]
fn test_sweep_removes_excluded_and_spares_protected() {
    let temp = assert_fs::TempDir::new().unwrap();
    let image = temp.child("image");
    write(&image.child("lib64/libfoo.a"), "a");
    write(&image.child("lib64/libkeep.a"), "k");
    write(&image.child("lib64/pkgconfig/foo.pc"), "pc");
    write(&image.child("lib64/libfoo.so"), "so");

    let mut tree = open(image.path(), TreeMode::Resume, false);
    let rules = exclusion_rules(&[r".*\.a"]);
    let protected: HashSet<PathBuf> = [PathBuf::from("lib64/libkeep.a")].into_iter().collect();
    let mut usage = RuleUsage::new();

    let swept = tree
        .sweep_excluded(&rules, BuildProfile::Release, &protected, &mut usage)
        .unwrap();

    assert_eq!(
        swept,
        vec![PathBuf::from("lib64/libfoo.a"), PathBuf::from("lib64/pkgconfig")]
    );
    image.child("lib64/libfoo.a").assert(predicate::path::missing());
    image.child("lib64/pkgconfig").assert(predicate::path::missing());
    image.child("lib64/libkeep.a").assert("k");
    image.child("lib64/libfoo.so").assert("so");
    assert!(usage.unused(&rules, BuildProfile::Release).is_empty());
}

#[test]
fn test_sweep_keeps_directory_holding_protected_path() {
    let temp = assert_fs::TempDir::new().unwrap();
    let image = temp.child("image");
    write(&image.child("lib64/pkgconfig/keep.pc"), "keep");
    write(&image.child("lib64/pkgconfig/drop.pc"), "drop");

    let mut tree = open(image.path(), TreeMode::Resume, false);
    let rules = exclusion_rules(&[r".*/drop\.pc"]);
    let protected: HashSet<PathBuf> =
        [PathBuf::from("lib64/pkgconfig/keep.pc")].into_iter().collect();

    let swept = tree
        .sweep_excluded(&rules, BuildProfile::Release, &protected, &mut RuleUsage::new())
        .unwrap();

    assert_eq!(swept, vec![PathBuf::from("lib64/pkgconfig/drop.pc")]);
    image.child("lib64/pkgconfig/keep.pc").assert("keep");
}

#[test]
fn test_debug_profile_skips_release_exclusions() {
    let temp = assert_fs::TempDir::new().unwrap();
    let image = temp.child("image");
    write(&image.child("lib64/pkgconfig/foo.pc"), "pc");

    let mut tree = open(image.path(), TreeMode::Resume, false);
    let swept = tree
        .sweep_excluded(
            &exclusion_rules(&[]),
            BuildProfile::Debug,
            &HashSet::new(),
            &mut RuleUsage::new(),
        )
        .unwrap();

    assert!(swept.is_empty());
    image.child("lib64/pkgconfig/foo.pc").assert("pc");
}

#[test]
fn test_broken_symlinks_are_pruned() {
    let temp = assert_fs::TempDir::new().unwrap();
    let image = temp.child("image");
    write(&image.child("lib64/libbar.so.2"), "bar");
    link(&image.child("lib64/libbar.so"), "libbar.so.2");
    link(&image.child("lib64/libgone.so"), "libgone.so.1");

    let mut tree = open(image.path(), TreeMode::Resume, false);
    let removed = tree.sweep_broken_symlinks().unwrap();

    assert_eq!(removed, vec![PathBuf::from("lib64/libgone.so")]);
    image.child("lib64/libbar.so").assert("bar");
}

#[test]
fn test_resume_removes_interrupted_copies() {
    let temp = assert_fs::TempDir::new().unwrap();
    let image = temp.child("image");
    write(&image.child("lib64/.libz.so.1.portroot-partial"), "half");
    write(&image.child("lib64/libz.so.1"), "whole");

    let tree = open(image.path(), TreeMode::Resume, false);

    assert!(tree.moved_aside().is_none());
    image
        .child("lib64/.libz.so.1.portroot-partial")
        .assert(predicate::path::missing());
    image.child("lib64/libz.so.1").assert("whole");
}

#[test]
fn test_fresh_moves_existing_tree_aside() {
    let temp = assert_fs::TempDir::new().unwrap();
    let image = temp.child("image");
    write(&image.child("lib64/libold.so"), "old");

    let first = open(image.path(), TreeMode::Fresh, false);
    let aside = first.moved_aside().unwrap().to_path_buf();
    assert!(aside.join("lib64/libold.so").exists());
    image.assert(predicate::path::is_dir());
    image.child("lib64").assert(predicate::path::missing());

    // A second fresh open in the same second must not collide
    let second = open(image.path(), TreeMode::Fresh, false);
    let again = second.moved_aside().unwrap();
    assert_ne!(again, aside.as_path());
    assert!(aside.join("lib64/libold.so").exists());
}

#[test]
fn test_fresh_with_trailing_slash_moves_tree_to_sibling() {
    let temp = assert_fs::TempDir::new().unwrap();
    let image = temp.child("image");
    write(&image.child("lib64/libold.so"), "old");

    let root = PathBuf::from(format!("{}/", image.path().display()));
    let tree = open(&root, TreeMode::Fresh, false);
    let aside = tree.moved_aside().unwrap();

    assert_eq!(aside.parent(), Some(temp.path()));
    assert!(aside
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("image.prev-"));
    assert!(aside.join("lib64/libold.so").exists());
    image.child("lib64").assert(predicate::path::missing());
}

#[test]
fn test_read_only_host_directory_stays_writable_in_image() {
    let temp = assert_fs::TempDir::new().unwrap();
    let host_dir = temp.child("host/usr/lib64");
    let lib = host_dir.child("libz.so.1");
    write(&lib, "elf");
    fs::set_permissions(host_dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

    let image = temp.child("image");
    let mut tree = open(image.path(), TreeMode::Fresh, false);
    let dir = tree.add(host_dir.path(), Path::new("lib64"));
    let file = tree.add(lib.path(), Path::new("lib64/libz.so.1"));
    fs::set_permissions(host_dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(dir.unwrap(), Placement::Written);
    assert_eq!(file.unwrap(), Placement::Written);
    let mode = fs::metadata(image.child("lib64").path())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o700, 0o700);
    image.child("lib64/libz.so.1").assert("elf");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_second_placement_writes_nothing(
        names in prop::collection::btree_set("[a-z]{1,8}", 1..6),
    ) {
        let temp = tempfile::TempDir::new().unwrap();
        let host = temp.path().join("host");
        fs::create_dir_all(&host).unwrap();
        for name in &names {
            fs::write(host.join(name), name.as_bytes()).unwrap();
        }

        let image = temp.path().join("image");
        let mut first = open(&image, TreeMode::Fresh, false);
        for name in &names {
            first.add(&host.join(name), &Path::new("lib").join(name)).unwrap();
        }
        prop_assert_eq!(first.writes(), names.len() as u64);

        let mut second = open(&image, TreeMode::Resume, false);
        for name in &names {
            let placement = second.add(&host.join(name), &Path::new("lib").join(name)).unwrap();
            prop_assert_eq!(placement, Placement::AlreadyPresent);
        }
        prop_assert_eq!(second.writes(), 0);
    }
}
