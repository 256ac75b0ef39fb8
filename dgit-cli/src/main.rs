//! dgit: a small local version-control system.
//!
//! # Usage
//!
//! ```bash
//! dgit init
//! dgit add hello.txt
//! dgit commit "say hello"
//! dgit branch feature
//! dgit checkout feature
//! dgit merge master
//! dgit log
//!
//! # Another repository on the same filesystem
//! dgit add-remote origin ../other
//! dgit push origin master
//! dgit pull origin master
//! ```
//!
//! Every command opens the repository in the working directory (or `-C
//! <dir>`), runs, and saves the state once on success. A failed command
//! prints its error, leaves the saved state untouched and exits with
//! status 1.

mod format;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dgit_core::{MergeOutcome, RepoConfig, Repository};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "dgit")]
#[command(author = "dgit Contributors")]
#[command(version = "0.1.0")]
#[command(about = "A small local version-control system")]
struct Cli {
    /// Run as if started in this directory
    #[arg(short = 'C', global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a repository in the current directory
    Init {
        /// Name of the first branch
        #[arg(long)]
        default_branch: Option<String>,
    },

    /// Stage a file for the next commit
    Add { file: String },

    /// Record the staged changes
    Commit { message: String },

    /// Unstage a file, removing it from the next commit if it is tracked
    Rm { file: String },

    /// Show the history of the current branch
    Log,

    /// Show every commit ever made
    GlobalLog,

    /// Print the ids of commits with the given message
    Find { message: String },

    /// Show branches, staged and removed files, and working-tree changes
    Status,

    /// Create a branch at the current commit
    Branch { name: String },

    /// Delete a branch pointer
    RmBranch { name: String },

    /// `checkout -- <file>`, `checkout <commit> -- <file>` or `checkout <branch>`
    Checkout {
        /// Branch name, or commit id when a file follows `--`
        target: Option<String>,
        /// File to restore
        #[arg(last = true)]
        file: Option<String>,
    },

    /// Move the current branch to a commit and check it out
    Reset { commit: String },

    /// Merge a branch into the current branch
    Merge { branch: String },

    /// Register another repository by path
    AddRemote { name: String, path: PathBuf },

    /// Forget a remote
    RmRemote { name: String },

    /// Copy the current branch's history to a remote branch
    Push { remote: String, branch: String },

    /// Copy a remote branch into `<remote>/<branch>`
    Fetch { remote: String, branch: String },

    /// Fetch, then merge `<remote>/<branch>`
    Pull { remote: String, branch: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };

    if let Commands::Init { default_branch } = cli.command {
        let mut config = RepoConfig::default();
        if let Some(branch) = default_branch {
            config.default_branch = branch;
        }
        Repository::init_with(&dir, config, Box::new(dgit_core::SystemClock))?;
        return Ok(());
    }

    let mut repo = Repository::open(&dir)?;
    execute(&mut repo, cli.command)?;
    repo.save()?;
    Ok(())
}

fn execute(repo: &mut Repository, command: Commands) -> Result<()> {
    match command {
        Commands::Init { .. } => unreachable!("handled before opening the repository"),
        Commands::Add { file } => repo.add(&file)?,
        Commands::Commit { message } => {
            repo.commit(&message)?;
        }
        Commands::Rm { file } => repo.rm(&file)?,
        Commands::Log => {
            let abbrev = repo.config().abbrev_len;
            for commit in repo.log()? {
                print!("{}", format::log_entry(&commit, abbrev));
            }
        }
        Commands::GlobalLog => {
            let abbrev = repo.config().abbrev_len;
            for commit in repo.global_log()? {
                print!("{}", format::log_entry(&commit, abbrev));
            }
        }
        Commands::Find { message } => {
            for id in repo.find(&message)? {
                println!("{}", id);
            }
        }
        Commands::Status => print!("{}", format::status_report(&repo.status()?)),
        Commands::Branch { name } => repo.create_branch(&name)?,
        Commands::RmBranch { name } => repo.remove_branch(&name)?,
        Commands::Checkout { target, file } => match (target, file) {
            (commit, Some(file)) => repo.checkout_file(commit.as_deref(), &file)?,
            (Some(branch), None) => repo.checkout_branch(&branch)?,
            (None, None) => anyhow::bail!("Incorrect operands."),
        },
        Commands::Reset { commit } => {
            repo.reset(&commit)?;
        }
        Commands::Merge { branch } => report_merge(&repo.merge(&branch)?),
        Commands::AddRemote { name, path } => repo.add_remote(&name, path)?,
        Commands::RmRemote { name } => repo.remove_remote(&name)?,
        Commands::Push { remote, branch } => {
            repo.push(&remote, &branch)?;
        }
        Commands::Fetch { remote, branch } => {
            repo.fetch(&remote, &branch)?;
        }
        Commands::Pull { remote, branch } => report_merge(&repo.pull(&remote, &branch)?),
    }
    Ok(())
}

fn report_merge(outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::UpToDate => println!("Given branch is an ancestor of the current branch."),
        MergeOutcome::FastForward(_) => println!("Current branch fast-forwarded."),
        MergeOutcome::Merged { .. } if outcome.has_conflicts() => {
            println!("Encountered a merge conflict.")
        }
        MergeOutcome::Merged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dgit(repo: &mut Repository, args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(std::iter::once("dgit").chain(args.iter().copied()))?;
        execute(repo, cli.command)
    }

    fn read(repo: &Repository, name: &str) -> String {
        fs::read_to_string(repo.work_dir().join(name)).unwrap()
    }

    #[test]
    fn test_checkout_forms() {
        let tmp = TempDir::new().unwrap();
        let mut repo = Repository::init(tmp.path()).unwrap();
        fs::write(tmp.path().join("f.txt"), "v1").unwrap();
        dgit(&mut repo, &["add", "f.txt"]).unwrap();
        dgit(&mut repo, &["commit", "v1"]).unwrap();
        let first = repo.head_commit().unwrap().id().short(8);
        fs::write(tmp.path().join("f.txt"), "v2").unwrap();
        dgit(&mut repo, &["add", "f.txt"]).unwrap();
        dgit(&mut repo, &["commit", "v2"]).unwrap();

        fs::write(tmp.path().join("f.txt"), "scratch").unwrap();
        dgit(&mut repo, &["checkout", "--", "f.txt"]).unwrap();
        assert_eq!(read(&repo, "f.txt"), "v2");

        dgit(&mut repo, &["checkout", &first, "--", "f.txt"]).unwrap();
        assert_eq!(read(&repo, "f.txt"), "v1");

        dgit(&mut repo, &["checkout", "--", "f.txt"]).unwrap();
        dgit(&mut repo, &["branch", "side"]).unwrap();
        dgit(&mut repo, &["checkout", "side"]).unwrap();
        assert_eq!(repo.head(), "side");
    }

    #[test]
    fn test_checkout_without_operands() {
        let tmp = TempDir::new().unwrap();
        let mut repo = Repository::init(tmp.path()).unwrap();
        let err = dgit(&mut repo, &["checkout"]).unwrap_err();
        assert_eq!(err.to_string(), "Incorrect operands.");
    }

    #[test]
    fn test_failed_command_leaves_saved_state() {
        let tmp = TempDir::new().unwrap();
        Repository::init(tmp.path()).unwrap();
        let cli = Cli::try_parse_from(["dgit", "-C", tmp.path().to_str().unwrap(), "rm-branch", "master"]).unwrap();
        assert!(run(cli).is_err());
        let cli = Cli::try_parse_from(["dgit", "-C", tmp.path().to_str().unwrap(), "branch", "dev"]).unwrap();
        run(cli).unwrap();
        let repo = Repository::open(tmp.path()).unwrap();
        assert!(repo.branches().contains_key("dev"));
    }
}
