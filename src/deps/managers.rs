//! Package managers for build dependencies

use super::{run_manager, DependencyManager, Packages};
use crate::error::{PlatformError, PlatformResult};
use crate::process::{self, BuildEnv};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

fn write_manifest(path: &Path, content: &str) -> PlatformResult<()> {
    fs::write(path, content).map_err(|e| PlatformError::io(format!("writing {}", path.display()), e))
}

fn path_string(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

/// Composer, for PHP tools
pub struct Composer;

impl DependencyManager for Composer {
    fn stack(&self) -> &str {
        "php"
    }

    fn command_name(&self) -> String {
        "composer".to_string()
    }

    fn install_help(&self) -> &'static str {
        "See https://getcomposer.org/download/ for installation instructions."
    }

    fn bin_paths(&self, prefix: &Path) -> Vec<PathBuf> {
        vec![prefix.join("vendor").join("bin")]
    }

    fn install(&self, prefix: &Path, packages: &Packages, env: &BuildEnv) -> PlatformResult<()> {
        let manifest = json!({ "require": packages });
        write_manifest(&prefix.join("composer.json"), &serde_json::to_string_pretty(&manifest)?)?;
        run_manager(
            self.stack(),
            "composer",
            &["install", "--no-progress", "--no-interaction"],
            prefix,
            env,
        )
    }
}

/// npm, for Node.js tools
pub struct Npm;

impl DependencyManager for Npm {
    fn stack(&self) -> &str {
        "nodejs"
    }

    fn command_name(&self) -> String {
        "npm".to_string()
    }

    fn install_help(&self) -> &'static str {
        "See https://docs.npmjs.com/downloading-and-installing-node-js-and-npm for installation instructions."
    }

    fn bin_paths(&self, prefix: &Path) -> Vec<PathBuf> {
        vec![prefix.join("node_modules").join(".bin")]
    }

    fn env_vars(&self, prefix: &Path) -> BuildEnv {
        let mut env = BuildEnv::new();
        env.insert("NODE_PATH".to_string(), path_string(prefix.join("node_modules")));
        env
    }

    fn install(&self, prefix: &Path, packages: &Packages, env: &BuildEnv) -> PlatformResult<()> {
        let manifest = json!({
            "name": "build-dependencies",
            "private": true,
            "dependencies": packages,
        });
        write_manifest(&prefix.join("package.json"), &serde_json::to_string_pretty(&manifest)?)?;
        run_manager(self.stack(), "npm", &["install", "--no-audit", "--no-fund"], prefix, env)
    }
}

/// pip, for Python tools
pub struct Pip {
    stack: String,
}

impl Pip {
    pub fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
        }
    }

    /// Format packages as a requirements file
    pub fn requirements(packages: &Packages) -> String {
        let mut lines = Vec::with_capacity(packages.len());
        for (package, version) in packages {
            let line = if version.starts_with(['<', '>', '!', '=', '~']) {
                format!("{}{}", package, version)
            } else if version == "*" || version.is_empty() {
                package.clone()
            } else {
                format!("{}=={}", package, version)
            };
            lines.push(line);
        }
        lines.join("\n") + "\n"
    }
}

impl DependencyManager for Pip {
    fn stack(&self) -> &str {
        &self.stack
    }

    fn command_name(&self) -> String {
        let candidates: &[&str] = match self.stack.as_str() {
            "python3" => &["pip3", "pip"],
            "python2" => &["pip2", "pip"],
            _ => &["pip", "pip3", "pip2"],
        };
        candidates
            .iter()
            .find(|c| process::command_exists(c))
            .unwrap_or(&"pip")
            .to_string()
    }

    fn install_help(&self) -> &'static str {
        "See https://pip.pypa.io/en/stable/installation/ for installation instructions."
    }

    fn bin_paths(&self, prefix: &Path) -> Vec<PathBuf> {
        vec![prefix.join("bin")]
    }

    fn env_vars(&self, prefix: &Path) -> BuildEnv {
        let mut env = BuildEnv::new();
        // Packages land in lib/pythonX.Y/site-packages
        let Ok(entries) = fs::read_dir(prefix.join("lib")) else {
            return env;
        };
        let mut versions: Vec<PathBuf> = entries
            .flatten()
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.path())
            .collect();
        versions.sort();
        if let Some(dir) = versions.into_iter().next() {
            env.insert("PYTHONPATH".to_string(), path_string(dir.join("site-packages")));
        }
        env
    }

    fn install(&self, prefix: &Path, packages: &Packages, env: &BuildEnv) -> PlatformResult<()> {
        write_manifest(&prefix.join("requirements.txt"), &Self::requirements(packages))?;
        let command = self.command_name();
        run_manager(
            &self.stack,
            &command,
            &["install", "--requirement=requirements.txt", "--prefix=."],
            prefix,
            env,
        )
    }
}

/// Bundler, for Ruby tools
pub struct Bundler;

impl Bundler {
    /// Format packages as a Gemfile
    pub fn gemfile(packages: &Packages) -> String {
        let mut gemfile = String::from("source 'https://rubygems.org'\n\n");
        for (package, version) in packages {
            if version == "*" || version.is_empty() {
                gemfile.push_str(&format!("gem '{}'\n", package));
            } else {
                gemfile.push_str(&format!("gem '{}', '{}'\n", package, version));
            }
        }
        gemfile
    }
}

impl DependencyManager for Bundler {
    fn stack(&self) -> &str {
        "ruby"
    }

    fn command_name(&self) -> String {
        "bundle".to_string()
    }

    fn install_help(&self) -> &'static str {
        "See https://bundler.io/ for installation instructions."
    }

    fn bin_paths(&self, prefix: &Path) -> Vec<PathBuf> {
        vec![prefix.join("bin")]
    }

    fn env_vars(&self, prefix: &Path) -> BuildEnv {
        let mut env = BuildEnv::new();
        env.insert("GEM_PATH".to_string(), path_string(prefix.join("gems")));
        env
    }

    fn install(&self, prefix: &Path, packages: &Packages, env: &BuildEnv) -> PlatformResult<()> {
        write_manifest(&prefix.join("Gemfile"), &Self::gemfile(packages))?;
        let mut env = env.clone();
        env.insert("BUNDLE_GEMFILE".to_string(), path_string(prefix.join("Gemfile")));
        env.insert("BUNDLE_PATH".to_string(), path_string(prefix.join("gems")));
        run_manager(self.stack(), "bundle", &["install", "--binstubs=bin"], prefix, &env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn packages(pairs: &[(&str, &str)]) -> Packages {
        pairs
            .iter()
            .map(|(p, v)| (p.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn requirements_format() {
        let txt = Pip::requirements(&packages(&[
            ("pipenv", "*"),
            ("requests", ">=2.0"),
            ("six", "1.16.0"),
        ]));
        assert_eq!(txt, "pipenv\nrequests>=2.0\nsix==1.16.0\n");
    }

    #[test]
    fn gemfile_format() {
        let gemfile = Bundler::gemfile(&packages(&[("sass", "*"), ("rake", "~> 13.0")]));
        assert!(gemfile.contains("gem 'rake', '~> 13.0'\n"));
        assert!(gemfile.contains("gem 'sass'\n"));
    }

    #[test]
    fn pip_finds_site_packages() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("lib/python3.12/site-packages")).unwrap();
        let env = Pip::new("python3").env_vars(temp.path());
        assert!(env["PYTHONPATH"].ends_with("python3.12/site-packages"));
    }

    #[test]
    fn failed_install_carries_output() {
        let temp = TempDir::new().unwrap();
        let err = run_manager(
            "nodejs",
            "sh",
            &["-c", "echo 'npm ERR! 404' >&2; exit 1"],
            temp.path(),
            &BuildEnv::new(),
        )
        .unwrap_err();
        match err {
            PlatformError::DependencyInstall { stack, code, output, .. } => {
                assert_eq!(stack, "nodejs");
                assert_eq!(code, 1);
                assert!(output.contains("npm ERR! 404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
