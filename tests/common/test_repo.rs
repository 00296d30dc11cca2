//! On-disk git repository builder for tests that go through the `git` executable

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Temporary git repository with `main` as its branch
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new empty test repository
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Get the path to the test repository root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Add a file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    pub fn remove_file(&self, relative_path: &str) -> &Self {
        fs::remove_file(self.dir.path().join(relative_path)).expect("Failed to remove file");
        self
    }

    /// Move a file with `git mv`
    pub fn rename_file(&self, from: &str, to: &str) -> &Self {
        self.git(&["mv", from, to]);
        self
    }

    /// Initialize git with a fixed identity, on branch `main`
    pub fn init_git(&self) -> &Self {
        self.git(&["init"]);
        self.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        self.git(&["config", "user.email", "test@test.com"]);
        self.git(&["config", "user.name", "Test User"]);
        self
    }

    /// Create a git commit with all files
    pub fn commit(&self, message: &str) -> &Self {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-m", message]);
        self
    }

    /// Run a git command in the repository and expect success
    pub fn git(&self, args: &[&str]) {
        let output = Command::new("git")
            .current_dir(self.path())
            .args(args)
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
