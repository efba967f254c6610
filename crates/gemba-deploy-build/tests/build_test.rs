use std::path::{Path, PathBuf};
use std::process::Command;

use gemba_deploy_build::context::BuildContextError;
use gemba_deploy_build::revision::short_head;
use gemba_deploy_build::{BuildContext, source_revision};
use gemba_deploy_core::ImageConfig;
use tempfile::TempDir;

fn image(context: &str, dockerfile: &str) -> ImageConfig {
    ImageConfig {
        name: "gemba-score".to_owned(),
        tag: "abc123".to_owned(),
        context: PathBuf::from(context),
        dockerfile: PathBuf::from(dockerfile),
    }
}

/// Initialize a git repo with a Dockerfile and an initial commit.
fn init_git_project(dir: &Path) {
    std::fs::write(dir.join("Dockerfile"), "FROM python:3.12-slim\n").unwrap();

    for args in [
        &["init"][..],
        &["config", "user.email", "test@test.com"],
        &["config", "user.name", "Test"],
        &["add", "."],
        &["commit", "-m", "init"],
    ] {
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
    }
}

// ── Revision ──

#[test]
fn revision_matches_git_short_head() {
    let tmp = TempDir::new().unwrap();
    init_git_project(tmp.path());

    let expected = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(tmp.path())
        .output()
        .unwrap();
    let expected = String::from_utf8(expected.stdout).unwrap();

    assert_eq!(source_revision(tmp.path()).as_deref(), Some(expected.trim()));
}

#[test]
fn revision_absent_outside_repository() {
    let tmp = TempDir::new().unwrap();

    assert!(short_head(tmp.path()).is_err());
    assert_eq!(source_revision(tmp.path()), None);
}

// ── Build context ──

#[test]
fn locate_accepts_existing_context() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("Dockerfile"), "FROM scratch\n").unwrap();

    let ctx = BuildContext::locate(tmp.path(), &image(".", "Dockerfile")).unwrap();

    assert_eq!(ctx.dir, tmp.path().join("."));
    assert_eq!(ctx.dockerfile, std::path::PathBuf::from("Dockerfile"));
}

#[test]
fn locate_resolves_nested_dockerfile() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("app/docker")).unwrap();
    std::fs::write(tmp.path().join("app/docker/api.Dockerfile"), "FROM scratch\n").unwrap();

    let ctx = BuildContext::locate(tmp.path(), &image("app", "docker/api.Dockerfile")).unwrap();
    assert_eq!(ctx.dir, tmp.path().join("app"));
}

#[test]
fn locate_rejects_missing_directory() {
    let tmp = TempDir::new().unwrap();

    let err = BuildContext::locate(tmp.path(), &image("missing", "Dockerfile")).unwrap_err();
    assert!(matches!(err, BuildContextError::MissingDir(_)));
}

#[test]
fn locate_rejects_missing_dockerfile() {
    let tmp = TempDir::new().unwrap();

    let err = BuildContext::locate(tmp.path(), &image(".", "Dockerfile")).unwrap_err();
    assert!(matches!(err, BuildContextError::MissingDockerfile(ref p) if p.ends_with("Dockerfile")));
}
