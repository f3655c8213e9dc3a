use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for the showcase")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Run cargo deny check
    Deny,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
    /// Check the asset directory, then load it headlessly
    Assets {
        #[arg(default_value = "assets")]
        dir: PathBuf,
        /// Only check file headers, skip the headless load
        #[arg(long)]
        quick: bool,
    },
}

/// Expected files and the bytes each must start with.
const ASSETS: &[(&str, &[&[u8]])] = &[
    ("environment.hdr", &[b"#?RADIANCE", b"#?RGBE"]),
    ("model-transformed.glb", &[b"glTF"]),
    ("helvetiker_regular.typeface.json", &[b"{"]),
];

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_tests()?;
            run_doc()?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Test => run_tests()?,
        Commands::Deny => run_deny()?,
        Commands::Doc => run_doc()?,
        Commands::Build => run_build()?,
        Commands::Assets { dir, quick } => {
            check_asset_headers(&dir)?;
            if !quick {
                run_validate(&dir)?;
            }
        }
    }

    Ok(())
}

fn cargo(what: &str, args: &[&str]) -> Result<()> {
    println!("==> Running cargo {what}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {what} failed");
    }
    Ok(())
}

fn run_fmt() -> Result<()> {
    cargo("fmt --check", &["fmt", "--all", "--", "--check"])
}

fn run_clippy() -> Result<()> {
    cargo(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn run_tests() -> Result<()> {
    cargo("test", &["test", "--workspace"])
}

fn run_deny() -> Result<()> {
    cargo("deny check", &["deny", "check", "licenses", "bans", "sources"])
}

fn run_doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}

fn run_build() -> Result<()> {
    cargo("build", &["build", "--workspace"])
}

fn run_validate(dir: &Path) -> Result<()> {
    let dir = dir.display().to_string();
    cargo(
        "run -p showcase-cli validate",
        &["run", "-p", "showcase-cli", "--", "--assets", &dir, "validate"],
    )
}

fn check_asset_headers(dir: &Path) -> Result<()> {
    println!("==> Checking assets in {}", dir.display());
    let mut problems = Vec::new();
    for (name, magics) in ASSETS {
        let path = dir.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let head = trim_leading_whitespace(&bytes);
                if magics.iter().any(|m| head.starts_with(m)) {
                    println!("    ok  {name} ({} bytes)", bytes.len());
                } else {
                    problems.push(format!("{name}: unexpected file header"));
                }
            }
            Err(e) => problems.push(format!("{name}: {e}")),
        }
    }
    if !problems.is_empty() {
        anyhow::bail!("asset check failed:\n  {}", problems.join("\n  "));
    }
    Ok(())
}

fn trim_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}
