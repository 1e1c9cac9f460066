//! End-to-end pipeline tests over temporary directories, with stub git and
//! jet executables standing in for the real tools and in-memory project
//! sources standing in for the platform API.

use std::cell::Cell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use keyroller::api::{ApiError, ApiResult, Project, ProjectKind, ProjectPage};
use keyroller::crypto::Jet;
use keyroller::pipeline::{KeyResetter, ProjectSource};
use keyroller::vcs::Git;
use keyroller::{Config, Ledger, Pipeline, Replacement};

/// Fake git: `clone` materializes a repository directory containing one
/// encrypted file; every other subcommand succeeds silently.
fn stub_git(dir: &Path) -> Git {
    let program = dir.join("stub-git");
    fs::write(
        &program,
        "#!/bin/sh\n\
         if [ \"$1\" = clone ]; then\n\
           mkdir -p widget\n\
           printf 'token=OLD_KEY\\n' > widget/secrets.encrypted\n\
         fi\n\
         exit 0\n",
    )
    .unwrap();
    fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
    Git::with_program(program.to_string_lossy().into_owned())
}

/// Fake jet: decrypt and encrypt both just copy input to output.
fn stub_jet(dir: &Path) -> Jet {
    let program = dir.join("stub-jet");
    fs::write(&program, "#!/bin/sh\ncp \"$4\" \"$5\"\n").unwrap();
    fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
    Jet::with_program(program.to_string_lossy().into_owned())
}

fn widget_project() -> Project {
    Project {
        uuid: "7de09100".to_string(),
        name: "acme/widget".to_string(),
        repository_url: "https://github.com/acme/widget".to_string(),
        repository_provider: "github".to_string(),
        aes_key: "old-key-material".to_string(),
        kind: ProjectKind::Pro,
    }
}

struct SinglePage {
    projects: Vec<Project>,
}

impl ProjectSource for SinglePage {
    fn fetch_page(&self, page: u32, _per_page: u32) -> ApiResult<ProjectPage> {
        assert_eq!(page, 1);
        Ok(ProjectPage { projects: self.projects.clone(), page: 1, total_pages: 1 })
    }
}

/// Counts calls; optionally fails every reset.
struct CountingResetter {
    calls: Cell<u32>,
    fail: bool,
}

impl CountingResetter {
    fn succeeding() -> Self {
        Self { calls: Cell::new(0), fail: false }
    }

    fn failing() -> Self {
        Self { calls: Cell::new(0), fail: true }
    }
}

impl KeyResetter for CountingResetter {
    fn reset_key(&self, _project: &Project) -> ApiResult<String> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(ApiError::Api { status: 500, message: "reset failed".to_string() });
        }
        Ok("new-key-material".to_string())
    }
}

fn rotation_config() -> Config {
    Config {
        encrypted_file_patterns: vec!["\\.encrypted$".to_string()],
        replacements: vec![Replacement {
            find: "OLD_KEY".to_string(),
            replace: "NEW_KEY".to_string(),
        }],
        ..Config::default()
    }
}

fn ledger_names(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(data) => data.lines().map(String::from).collect(),
        Err(_) => Vec::new(),
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    base: PathBuf,
    git: Git,
    jet: Jet,
    ledger_path: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_path_buf();
    let git = stub_git(&base);
    let jet = stub_jet(&base);
    let ledger_path = base.join("completed-projects.txt");
    Fixture { _dir: dir, base, git, jet, ledger_path }
}

#[test]
fn full_rotation_records_ledger_report_and_pr_url() {
    let f = fixture();
    let config = rotation_config();
    let source = SinglePage { projects: vec![widget_project()] };
    let resetter = CountingResetter::succeeding();

    let report = Pipeline::new(&config, &source, &resetter, Ledger::new(&f.ledger_path), &f.base)
        .with_tools(f.git.clone(), f.jet.clone())
        .with_pause(None)
        .run()
        .unwrap();

    assert_eq!(resetter.calls.get(), 1);
    assert_eq!(report.changes_for("acme/widget", "secrets.encrypted.decrypted"), Some(1));
    assert_eq!(
        report.pr_urls(),
        vec!["https://github.com/acme/widget/compare/master...develop"]
    );
    assert_eq!(ledger_names(&f.ledger_path), vec!["acme/widget"]);

    // The workspace never outlives its project.
    assert!(!f.base.join("widget").exists());
}

#[test]
fn key_reset_failure_abandons_project_without_ledger_entry() {
    let f = fixture();
    let config = rotation_config();
    let source = SinglePage { projects: vec![widget_project()] };
    let resetter = CountingResetter::failing();

    let report = Pipeline::new(&config, &source, &resetter, Ledger::new(&f.ledger_path), &f.base)
        .with_tools(f.git.clone(), f.jet.clone())
        .with_pause(None)
        .run()
        .unwrap();

    assert_eq!(resetter.calls.get(), 1);
    assert!(ledger_names(&f.ledger_path).is_empty());
    assert!(report.pr_urls().is_empty());
    assert!(!f.base.join("widget").exists());
}

#[test]
fn project_without_secrets_is_ledgered_without_key_reset() {
    let f = fixture();
    let mut config = rotation_config();
    // Nothing in the stub repository matches this pattern.
    config.encrypted_file_patterns = vec!["\\.vault$".to_string()];
    let source = SinglePage { projects: vec![widget_project()] };
    let resetter = CountingResetter::succeeding();

    let report = Pipeline::new(&config, &source, &resetter, Ledger::new(&f.ledger_path), &f.base)
        .with_tools(f.git.clone(), f.jet.clone())
        .with_pause(None)
        .run()
        .unwrap();

    assert_eq!(resetter.calls.get(), 0);
    assert_eq!(ledger_names(&f.ledger_path), vec!["acme/widget"]);
    assert!(report.pr_urls().is_empty());
    assert!(!f.base.join("widget").exists());
}

#[test]
fn project_without_secrets_still_rotates_when_configured() {
    let f = fixture();
    let mut config = rotation_config();
    config.encrypted_file_patterns = vec!["\\.vault$".to_string()];
    config.reset_keys_in_projects_without_encrypted_files = true;
    let source = SinglePage { projects: vec![widget_project()] };
    let resetter = CountingResetter::succeeding();

    let report = Pipeline::new(&config, &source, &resetter, Ledger::new(&f.ledger_path), &f.base)
        .with_tools(f.git.clone(), f.jet.clone())
        .with_pause(None)
        .run()
        .unwrap();

    assert_eq!(resetter.calls.get(), 1);
    assert_eq!(ledger_names(&f.ledger_path), vec!["acme/widget"]);
    // No files were processed, so there is nothing to publish.
    assert!(report.pr_urls().is_empty());
}

#[test]
fn ledgered_project_is_not_touched_on_a_second_run() {
    let f = fixture();
    let config = rotation_config();
    let source = SinglePage { projects: vec![widget_project()] };

    let resetter = CountingResetter::succeeding();
    Pipeline::new(&config, &source, &resetter, Ledger::new(&f.ledger_path), &f.base)
        .with_tools(f.git.clone(), f.jet.clone())
        .with_pause(None)
        .run()
        .unwrap();
    assert_eq!(resetter.calls.get(), 1);

    // Second run: the project is in the ledger, so the batch is empty.
    let resetter = CountingResetter::succeeding();
    Pipeline::new(&config, &source, &resetter, Ledger::new(&f.ledger_path), &f.base)
        .with_tools(f.git.clone(), f.jet.clone())
        .with_pause(None)
        .run()
        .unwrap();
    assert_eq!(resetter.calls.get(), 0);
    assert_eq!(ledger_names(&f.ledger_path), vec!["acme/widget"]);
}

#[test]
fn unreadable_workspace_aborts_the_whole_run() {
    let f = fixture();
    let config = rotation_config();

    // This git succeeds without ever creating the clone directory, so the
    // workspace scan fails. That failure means local state can no longer be
    // trusted, so the run must stop before the next project.
    let program = f.base.join("hollow-git");
    fs::write(&program, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
    let hollow_git = Git::with_program(program.to_string_lossy().into_owned());

    let mut second = widget_project();
    second.name = "acme/gadget".to_string();
    let source = SinglePage { projects: vec![widget_project(), second] };
    let resetter = CountingResetter::succeeding();

    let result = Pipeline::new(&config, &source, &resetter, Ledger::new(&f.ledger_path), &f.base)
        .with_tools(hollow_git, f.jet.clone())
        .with_pause(None)
        .run();

    assert!(result.is_err());
    assert_eq!(resetter.calls.get(), 0);
    assert!(ledger_names(&f.ledger_path).is_empty());
}

#[test]
fn clone_failure_skips_project_but_not_the_batch() {
    let f = fixture();
    let config = rotation_config();

    // A provider with no clone host fails before any git call; the second
    // project still gets processed.
    let mut unknown = widget_project();
    unknown.name = "acme/unknowable".to_string();
    unknown.repository_provider = "sourcehut".to_string();
    let source = SinglePage { projects: vec![unknown, widget_project()] };
    let resetter = CountingResetter::succeeding();

    Pipeline::new(&config, &source, &resetter, Ledger::new(&f.ledger_path), &f.base)
        .with_tools(f.git.clone(), f.jet.clone())
        .with_pause(None)
        .run()
        .unwrap();

    assert_eq!(resetter.calls.get(), 1);
    assert_eq!(ledger_names(&f.ledger_path), vec!["acme/widget"]);
}
