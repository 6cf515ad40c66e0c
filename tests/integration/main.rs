//! Integration tests for Binsmith

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Binsmith pointed at a config file inside `dir`, isolated from the
    /// user's own config and tokens
    fn binsmith(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("binsmith");
        cmd.env("BINSMITH_CONFIG", dir.join("config.toml"))
            .env_remove("GITHUB_TOKEN")
            .env_remove("BINSMITH_STORAGE_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    fn write_config(dir: &Path, content: &str) {
        std::fs::write(dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("On-demand Go binaries"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("binsmith"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[resolver]"))
            .stdout(predicate::str::contains("[dispatcher]"));
    }

    #[test]
    fn config_show_redacts_tokens() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .env("GITHUB_TOKEN", "ghp_integration_secret")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("<redacted>"))
            .stdout(predicate::str::contains("ghp_integration_secret").not());
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .args(["config", "init"])
            .assert()
            .success();

        let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(written.contains("[builder]"));
    }

    #[test]
    fn invalid_config_fails() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "[general\n");
        binsmith(dir.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn platforms_lists_defaults() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .arg("platforms")
            .assert()
            .success()
            .stdout(predicate::str::contains("linux/amd64"))
            .stdout(predicate::str::contains("darwin/arm64"));
    }

    #[test]
    fn platforms_follow_config() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "[builder]\nplatforms = [\"freebsd/amd64\"]\n");
        binsmith(dir.path())
            .arg("platforms")
            .assert()
            .success()
            .stdout(predicate::str::contains("freebsd/amd64"))
            .stdout(predicate::str::contains("linux/amd64").not());
    }

    #[test]
    fn fetch_rejects_invalid_spec() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .args(["fetch", "not-a-package"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid package path"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn fetch_rejects_unsupported_platform() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("artifacts");
        write_config(
            dir.path(),
            &format!("[storage]\nbackend = \"fs\"\nroot = {:?}\n", root.display().to_string()),
        );
        binsmith(dir.path())
            .args(["fetch", "tj/triage@v1.0.0", "--os", "plan9", "--arch", "mips"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unsupported platform: plan9/mips"));
    }

    #[test]
    fn fetch_requires_bucket_for_gcs() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "[storage]\nbackend = \"gcs\"\n");
        binsmith(dir.path())
            .args(["fetch", "tj/triage@v1.0.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("requires `bucket`"));
    }

    #[test]
    fn resolve_rejects_invalid_spec() {
        let dir = TempDir::new().unwrap();
        binsmith(dir.path())
            .args(["resolve", "tj/../triage"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid package path"));
    }
}
