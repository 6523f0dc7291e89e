use clap::{Parser, Subcommand};

use ghmirror::broker::{CredentialBroker, StaticSession};
use ghmirror::cache::{ChangeSet, ChangedFile, RemovedFile, TreeCache};
use ghmirror::config::Config;
use ghmirror::crypto::{AesGcmCipher, Cipher};
use ghmirror::remote::GithubClient;
use ghmirror::store::{EntryKind, SqliteStore};
use ghmirror::types::{Branch, Namespace, RepoKey};

#[derive(Parser)]
#[command(
    name = "ghmirror",
    about = "Mirror GitHub repository trees into a local database"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory, fetching it on first access
    Ls {
        /// Repository in owner/repo format
        repo: String,
        branch: String,
        /// Directory path, defaults to the repository root
        #[arg(default_value = "")]
        path: String,
        /// Bearer credential (defaults to $GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },

    /// Apply a change set to the cached directories
    Reconcile {
        /// Repository in owner/repo format
        repo: String,
        branch: String,
        /// Removed file path
        #[arg(long = "removed", value_name = "PATH")]
        removed: Vec<String>,
        /// Modified file, as PATH=SHA
        #[arg(long = "modified", value_name = "PATH=SHA", value_parser = parse_changed)]
        modified: Vec<ChangedFile>,
        /// Added file, as PATH=SHA
        #[arg(long = "added", value_name = "PATH=SHA", value_parser = parse_changed)]
        added: Vec<ChangedFile>,
        /// Bearer credential (defaults to $GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },

    /// Print the credential a user would get for a repository
    Token {
        /// Repository in owner/repo format
        repo: String,
        #[arg(long)]
        user: String,
        /// Linked GitHub login, if the account has one
        #[arg(long)]
        github_login: Option<String>,
    },

    /// Encrypt and store a user's personal GitHub token
    ProvisionUserToken {
        #[arg(long)]
        user: String,
        token: String,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ls {
            repo,
            branch,
            path,
            token,
        } => cmd_ls(&repo, &branch, &path, token),
        Commands::Reconcile {
            repo,
            branch,
            removed,
            modified,
            added,
            token,
        } => {
            let changes = ChangeSet {
                removed: removed.into_iter().map(|path| RemovedFile { path }).collect(),
                modified,
                added,
            };
            cmd_reconcile(&repo, &branch, &changes, token)
        }
        Commands::Token {
            repo,
            user,
            github_login,
        } => cmd_token(&repo, &user, github_login),
        Commands::ProvisionUserToken { user, token } => cmd_provision_user_token(&user, &token),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_changed(s: &str) -> Result<ChangedFile, String> {
    let (path, sha) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected PATH=SHA, got {:?}", s))?;
    if path.is_empty() || sha.is_empty() {
        return Err(format!("expected PATH=SHA, got {:?}", s));
    }
    Ok(ChangedFile {
        path: path.to_string(),
        sha: sha.to_string(),
    })
}

fn parse_namespace(repo: &str, branch: &str) -> Result<Namespace, Box<dyn std::error::Error>> {
    let key: RepoKey = repo
        .parse()
        .map_err(|e| format!("Invalid repo format: {}", e))?;
    let branch: Branch = branch
        .parse()
        .map_err(|e| format!("Invalid branch name: {}", e))?;
    Ok(Namespace::new(key, branch))
}

fn resolve_token(token: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    token
        .or_else(|| std::env::var("GITHUB_TOKEN").ok())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "no credential: pass --token or set GITHUB_TOKEN".into())
}

fn open_store(config: &Config) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&config.db_path)?;
    store.init()?;
    Ok(store)
}

fn cmd_ls(
    repo: &str,
    branch: &str,
    path: &str,
    token: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ns = parse_namespace(repo, branch)?;
    let token = resolve_token(token)?;
    let config = Config::from_env()?;
    let cache = TreeCache::new(open_store(&config)?, GithubClient::new(&config));

    let entries = cache.populate_directory(&ns, path, &token)?;
    if entries.is_empty() {
        println!("(empty)");
        return Ok(());
    }

    println!("{:<5} {:<12} {}", "TYPE", "SHA", "PATH");
    println!("{}", "-".repeat(60));
    for entry in entries {
        let sha = entry.sha.as_deref().unwrap_or("-");
        let name = match entry.kind {
            EntryKind::Tree => format!("{}/", entry.path),
            EntryKind::Blob => entry.path,
        };
        println!(
            "{:<5} {:<12} {}",
            entry.kind,
            if sha.len() > 12 { &sha[..12] } else { sha },
            name
        );
    }

    Ok(())
}

fn cmd_reconcile(
    repo: &str,
    branch: &str,
    changes: &ChangeSet,
    token: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ns = parse_namespace(repo, branch)?;
    let token = resolve_token(token)?;
    let config = Config::from_env()?;
    let cache = TreeCache::new(open_store(&config)?, GithubClient::new(&config));

    let report = cache.reconcile(&ns, changes, &token)?;

    println!("Reconciled {}", ns);
    println!("  Deleted:  {}", report.deleted);
    println!("  Updated:  {}", report.updated);
    println!("  Inserted: {}", report.inserted);
    println!("  Skipped:  {}", report.skipped);
    println!("  Queries:  {}", report.remote_queries);

    Ok(())
}

fn cmd_token(
    repo: &str,
    user: &str,
    github_login: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let key: RepoKey = repo
        .parse()
        .map_err(|e| format!("Invalid repo format: {}", e))?;
    let config = Config::from_env()?;
    let cipher = AesGcmCipher::from_hex(config.require_secret_key()?)?;
    let broker = CredentialBroker::new(open_store(&config)?, GithubClient::new(&config), cipher);

    let session = StaticSession::user(user, github_login);
    let token = broker.request(&session).token(&key)?;
    println!("{}", token);

    Ok(())
}

fn cmd_provision_user_token(user: &str, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let cipher = AesGcmCipher::from_hex(config.require_secret_key()?)?;
    let store = open_store(&config)?;

    store.put_user_token(user, &cipher.encrypt(token)?)?;
    println!("Stored token for {}", user);

    Ok(())
}
