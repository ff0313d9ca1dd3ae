use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for netstep")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, validation tests
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Run all tests with scheduler invariant checks fatal in release mode
    Validate,
    /// Run the tick plan micro benchmark
    Bench,
    /// Build rustdoc for the workspace
    Doc,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_tests()?;
            run_validate()?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Test => run_tests()?,
        Commands::Validate => run_validate()?,
        Commands::Bench => run_bench()?,
        Commands::Doc => run_doc()?,
    }

    Ok(())
}

fn cargo(what: &str, args: &[&str]) -> Result<()> {
    println!("==> Running cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{what} failed");
    }
    Ok(())
}

fn run_fmt() -> Result<()> {
    cargo("cargo fmt check", &["fmt", "--all", "--", "--check"])
}

fn run_clippy() -> Result<()> {
    cargo(
        "cargo clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn run_tests() -> Result<()> {
    cargo("cargo test", &["test", "--workspace"])
}

fn run_validate() -> Result<()> {
    cargo(
        "validation tests",
        &[
            "test",
            "--workspace",
            "--release",
            "--features",
            "netstep-kernel/validation",
        ],
    )
}

fn run_bench() -> Result<()> {
    cargo(
        "tick plan bench",
        &["bench", "-p", "netstep-kernel", "--bench", "bench_tick_plan"],
    )
}

fn run_doc() -> Result<()> {
    cargo("cargo doc", &["doc", "--workspace", "--no-deps"])
}
