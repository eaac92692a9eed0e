use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use solkeep_core::distribution::{distribute, round_to_decimals};
use solkeep_core::keystore::parse_tag_list;
use solkeep_core::{Keypair, Keystore, KeystoreConfig, Session, WalletRecord, WalletSpec};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "SOLKEEP_PASSWORD";
const PASSWORD_CONFIRM_ENV: &str = "SOLKEEP_PASSWORD_CONFIRM";

#[derive(Parser, Debug)]
#[command(name = "solkeep", author, version, about = "Encrypted Solana wallet store", long_about = None)]
struct Cli {
    /// Store directory (defaults to $SOLKEEP_HOME, then the platform data dir)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, import and organise wallets
    Wallet {
        #[command(subcommand)]
        command: WalletCommand,
    },
    /// Plan randomized token distributions
    Spread {
        #[command(subcommand)]
        command: SpreadCommand,
    },
}

#[derive(Subcommand, Debug)]
enum WalletCommand {
    /// Generate a new keypair
    Generate {
        #[arg(long)]
        name: Option<String>,
        /// Comma separated
        #[arg(long)]
        tags: Option<String>,
    },
    /// Import an existing secret key
    ImportSeed {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        tags: Option<String>,
        /// Solana CLI keypair file (JSON byte array); prompts for a base58 secret when absent
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List wallets, optionally only those carrying every given tag
    List {
        #[arg(long)]
        tags: Option<String>,
    },
    Tag {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        tags: String,
    },
    /// Remove tags; `*` removes all of them
    Untag {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        tags: String,
    },
    /// Set a wallet's name, or clear it when --name is omitted
    Name {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Renumber all wallets 0..n and rebuild the name map
    Reindex,
    /// Report disagreements between records, indices and names
    Check,
    /// Decrypt a wallet's key to confirm the password
    Verify {
        #[arg(long)]
        wallet: String,
    },
}

#[derive(Subcommand, Debug)]
enum SpreadCommand {
    /// Print a randomized split of a total without sending anything
    Preview {
        #[arg(long)]
        count: usize,
        #[arg(long)]
        total: f64,
        #[arg(long, default_value = "0.5")]
        variance: f64,
        /// Round down to this many decimals
        #[arg(long)]
        decimals: Option<u32>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Wallet { command } => {
            let keystore = open_keystore(cli.home)?;
            match command {
                WalletCommand::Generate { name, tags } => {
                    let password = prompt_password_twice("New wallet password: ")?;
                    generate(&keystore, &password, name.as_deref(), tags.as_deref())
                }
                WalletCommand::ImportSeed { name, tags, file } => {
                    match read_keypair(file) {
                        Ok(keypair) => {
                            let password = prompt_password_twice("New wallet password: ")?;
                            import(&keystore, &keypair, &password, name.as_deref(), tags.as_deref())
                        }
                        Err(e) => Err(e),
                    }
                }
                WalletCommand::List { tags } => list(&keystore, tags.as_deref()),
                WalletCommand::Tag { wallet, tags } => keystore
                    .add_tags(&wallet, &parse_tag_list(&tags))
                    .map(|record| print_record(&record))
                    .map_err(anyhow::Error::from),
                WalletCommand::Untag { wallet, tags } => keystore
                    .remove_tags(&wallet, &parse_tag_list(&tags))
                    .map(|record| print_record(&record))
                    .map_err(anyhow::Error::from),
                WalletCommand::Name { wallet, name } => keystore
                    .rename(&wallet, name.as_deref())
                    .map(|record| print_record(&record))
                    .map_err(anyhow::Error::from),
                WalletCommand::Reindex => reindex(&keystore),
                WalletCommand::Check => check(&keystore),
                WalletCommand::Verify { wallet } => {
                    let password = prompt_password_once("Wallet password: ")?;
                    verify(&keystore, &wallet, &password)
                }
            }
        }
        Commands::Spread { command } => match command {
            SpreadCommand::Preview {
                count,
                total,
                variance,
                decimals,
            } => preview(count, total, variance, decimals),
        },
    };

    if let Err(e) = outcome {
        eprintln!("error: {e:#}");
    }
    Ok(())
}

fn open_keystore(home: Option<PathBuf>) -> Result<Keystore> {
    let config = KeystoreConfig::load(home).context("failed to load configuration")?;
    debug!(home = %config.home.display(), "opening keystore");
    let home = config.home.clone();
    Keystore::open(config).with_context(|| format!("failed to open store at {}", home.display()))
}

fn prompt_password_once(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let pw = rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))?;
    Ok(Zeroizing::new(pw))
}

fn prompt_password_twice(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            if let Ok(confirm) = std::env::var(PASSWORD_CONFIRM_ENV) {
                if confirm != pw {
                    return Err(anyhow!("password confirmation mismatch"));
                }
            }
            return Ok(Zeroizing::new(pw));
        }
    }
    let first = prompt_password_once(prompt)?;
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm password: ")
            .map_err(|e| anyhow!("password prompt: {e}"))?,
    );
    if *first != *second {
        return Err(anyhow!("password confirmation mismatch"));
    }
    Ok(first)
}

fn read_keypair(file: Option<PathBuf>) -> Result<Keypair> {
    match file {
        Some(path) => {
            let bytes = Zeroizing::new(
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
            );
            Ok(Keypair::from_json_bytes(&bytes)?)
        }
        None => {
            let secret = Zeroizing::new(
                rpassword::prompt_password("Base58 secret key: ")
                    .map_err(|e| anyhow!("secret prompt: {e}"))?,
            );
            Ok(Keypair::from_base58(&secret)?)
        }
    }
}

fn spec_tags(tags: Option<&str>) -> Vec<String> {
    tags.map(parse_tag_list).unwrap_or_default()
}

fn generate(keystore: &Keystore, password: &str, name: Option<&str>, tags: Option<&str>) -> Result<()> {
    let tags = spec_tags(tags);
    let (record, _) = keystore.generate(password, WalletSpec { name, tags: &tags })?;
    println!("Created wallet {}", record.public_key);
    print_record(&record);
    Ok(())
}

fn import(
    keystore: &Keystore,
    keypair: &Keypair,
    password: &str,
    name: Option<&str>,
    tags: Option<&str>,
) -> Result<()> {
    let tags = spec_tags(tags);
    let record = keystore.import(keypair, password, WalletSpec { name, tags: &tags })?;
    println!("Imported wallet {}", record.public_key);
    print_record(&record);
    Ok(())
}

fn list(keystore: &Keystore, tags: Option<&str>) -> Result<()> {
    let records = keystore.list(&spec_tags(tags))?;
    if records.is_empty() {
        println!("No wallets");
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn reindex(keystore: &Keystore) -> Result<()> {
    let records = keystore.reindex()?;
    println!("Reindexed {} wallets", records.len());
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn check(keystore: &Keystore) -> Result<()> {
    let issues = keystore.check()?;
    if issues.is_empty() {
        println!("Store is consistent");
    } else {
        for issue in &issues {
            println!("- {issue}");
        }
        println!("{} issue(s); `solkeep wallet reindex` rebuilds names and indices", issues.len());
    }
    Ok(())
}

fn verify(keystore: &Keystore, wallet: &str, password: &str) -> Result<()> {
    let session = Session::new();
    let guard = keystore.unlock(&session, wallet, password)?;
    let keypair = keystore.keypair(&session, guard.address())?;
    println!("Password OK, key belongs to {}", keypair.address());
    Ok(())
}

fn preview(count: usize, total: f64, variance: f64, decimals: Option<u32>) -> Result<()> {
    let mut rng = rand::thread_rng();
    let mut amounts = distribute(&mut rng, count, total, variance)?;
    if let Some(decimals) = decimals {
        amounts = round_to_decimals(&amounts, decimals, total)?;
    }
    let precision = decimals.unwrap_or(6) as usize;
    for (slot, amount) in amounts.iter().enumerate() {
        println!("{slot:>4}  {amount:.precision$}");
    }
    let sum: f64 = amounts.iter().sum();
    println!("total {sum:.precision$}");
    Ok(())
}

fn print_record(record: &WalletRecord) {
    let index = record
        .index
        .map_or_else(|| "-".to_string(), |i| i.to_string());
    let tags = if record.tags.is_empty() {
        String::new()
    } else {
        format!(
            " [{}]",
            record.tags.iter().cloned().collect::<Vec<_>>().join(", ")
        )
    };
    println!(
        "{index:>4}  {}  {}{tags}",
        record.public_key,
        record.name.as_deref().unwrap_or("-")
    );
}
