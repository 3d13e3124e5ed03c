//! Integration tests for the platform CLI

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Command with an isolated config file and plain output
    fn platform(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("platform");
        cmd.env("PLATFORM_CLI_CONFIG", home.path().join("config.toml"))
            .env("PLATFORM_CLI_NO_INTERACTION", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project(temp: &TempDir) -> std::path::PathBuf {
        let root = temp.path().join("project");
        write(&root.join(".platform/routes.yaml"), "{}\n");
        write(
            &root.join(".platform.app.yaml"),
            "name: app\ntype: 'golang:1.22'\nhooks:\n  build: 'echo built > public/built.txt'\n",
        );
        write(&root.join("public/index.html"), "<h1>hello</h1>");
        root
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        platform(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build"))
            .stdout(predicate::str::contains("cache"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        platform(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("platform"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        platform(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        platform(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[local]"))
            .stdout(predicate::str::contains("keep_builds = 10"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let home = TempDir::new().unwrap();
        fs::write(home.path().join("config.toml"), "[build\n").unwrap();
        platform(&home)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid CLI configuration"));
    }

    #[test]
    fn build_links_web_root() {
        let home = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let root = project(&temp);

        platform(&home)
            .arg("build")
            .arg("--source")
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("[OK]"))
            .stdout(predicate::str::contains("Build complete"));

        let www = root.join("_www");
        assert!(fs::symlink_metadata(&www).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(www.join("index.html")).unwrap(), "<h1>hello</h1>");
        assert_eq!(fs::read_to_string(www.join("built.txt")).unwrap().trim(), "built");
    }

    #[test]
    fn failing_hook_fails_build() {
        let home = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        write(
            &root.join(".platform.app.yaml"),
            "name: app\nhooks:\n  build: 'echo compile error; exit 2'\n",
        );

        platform(&home)
            .args(["build", "--no-archive", "--source"])
            .arg(&root)
            .assert()
            .failure()
            .stdout(predicate::str::contains("[FAIL]"))
            .stdout(predicate::str::contains("compile error"))
            .stderr(predicate::str::contains("1 of 1 application(s) failed"));
        assert!(fs::symlink_metadata(root.join("_www")).is_err());
    }

    #[test]
    fn build_outside_project_fails() {
        let home = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        platform(&home)
            .arg("build")
            .current_dir(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Project root not found"));
    }

    #[test]
    fn clean_keeps_active_build() {
        let home = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let root = project(&temp);

        for _ in 0..2 {
            platform(&home)
                .args(["build", "--no-clean", "--no-archive", "--source"])
                .arg(&root)
                .assert()
                .success();
        }

        platform(&home)
            .args(["clean", "--keep", "0", "--source"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("Deleted 1 build(s), kept 1"));
        assert_eq!(fs::read_to_string(root.join("_www/index.html")).unwrap(), "<h1>hello</h1>");
    }

    #[test]
    fn cache_list_empty() {
        let home = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        platform(&home)
            .args(["cache", "list", "--source"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached archives found"));
    }

    #[test]
    fn cache_clear_with_yes() {
        let home = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        write(&root.join(".platform/local/cache/shared/vendor/abc.tar.gz"), "x");

        platform(&home)
            .args(["cache", "clear", "--yes", "--source"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("Deleted all build caches"));
        assert!(!root.join(".platform/local/cache").exists());
    }
}
