mod card;
mod cipher;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use unseal_server::{base58, composite, CompositeKey, StoreKind};

use crate::card::CardData;
use crate::cipher::SealKey;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "unseal", about = "One-time links for card details", version)]
struct Cli {
    /// Server URL (default: http://localhost:8080 or $UNSEAL_SERVER)
    #[arg(long, env = "UNSEAL_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: $UNSEAL_PORT or 8080)
        #[arg(long, env = "UNSEAL_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $UNSEAL_HOST or 0.0.0.0)
        #[arg(long, env = "UNSEAL_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Record store: redb or memory
        #[arg(long, env = "UNSEAL_STORE", default_value = "redb")]
        store: StoreKind,
        /// Directory for unseal.db
        #[arg(long, env = "UNSEAL_DATA_DIR")]
        data_dir: Option<PathBuf>,
        /// Origin used in share URLs, e.g. https://unseal.example
        #[arg(long, env = "UNSEAL_PUBLIC_URL")]
        public_url: Option<String>,
    },
    /// Encrypt card details locally and print a one-time link
    Seal {
        /// Cardholder name
        #[arg(long)]
        name: String,
        /// Card number
        #[arg(long)]
        number: String,
        /// Expiry date (MM/YY)
        #[arg(long)]
        expiry: String,
        /// Security code
        #[arg(long)]
        cvv: String,
        /// Time to live, e.g. 1h, 24h, 7d. Rounded up to whole hours.
        #[arg(long, default_value = "1h")]
        ttl: String,
        /// Number of reads before the link stops working, or "unlimited"
        #[arg(long, default_value = "1")]
        reads: String,
    },
    /// Open a link (or a bare composite key) and print the card details
    Open {
        /// `<origin>/unseal/<id>#<key>` or `<version>.<id>.<key>`
        link: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("UNSEAL_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            store,
            data_dir,
            public_url,
        } => {
            let cfg = unseal_server::ServerConfig {
                host,
                port,
                store,
                data_dir,
                public_url,
                ..Default::default()
            };
            unseal_server::run(cfg).await
        }

        Commands::Seal {
            name,
            number,
            expiry,
            cvv,
            ttl,
            reads,
        } => {
            let card = CardData {
                cardholder_name: name,
                card_number: number,
                expiry_date: expiry,
                cvv,
            };
            let ttl_hours = parse_ttl_hours(&ttl)?;
            let reads = parse_reads(&reads)?;
            cmd_seal(&cli.server, &card, ttl_hours, reads).await
        }

        Commands::Open { link } => cmd_open(&cli.server, &link).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

#[derive(Serialize)]
struct StoreBody<'a> {
    encrypted: &'a str,
    iv: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reads: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreReply {
    id: String,
    reads: Option<u32>,
    expires_at: Option<String>,
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadReply {
    encrypted: String,
    iv: String,
    remaining_reads: Option<u32>,
}

async fn cmd_seal(
    server: &str,
    card: &CardData,
    ttl_hours: Option<u32>,
    reads: Option<u32>,
) -> Result<()> {
    let plaintext = serde_json::to_vec(card).context("encode card")?;
    let key = SealKey::generate();
    let (ciphertext, iv) = cipher::encrypt(&key, &plaintext)?;

    let encrypted = base58::encode(&ciphertext);
    let iv = base58::encode(&iv);
    let body = StoreBody {
        encrypted: &encrypted,
        iv: &iv,
        ttl: ttl_hours,
        reads,
    };

    let resp = Client::new()
        .post(format!("{}/store", server.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;
    let reply: StoreReply = parse_reply(resp).await?;

    let composite = CompositeKey::new(&reply.id, key.as_bytes());
    println!("sealed card {}", card.masked_number());
    println!("{}#{composite}", reply.url);
    match &reply.expires_at {
        Some(at) => println!("expires at {at}"),
        None => println!("never expires"),
    }
    match reply.reads {
        Some(n) => println!("can be opened {n} time(s)"),
        None => println!("can be opened any number of times"),
    }
    Ok(())
}

async fn cmd_open(server: &str, link: &str) -> Result<()> {
    let target = ShareTarget::parse(link, server)?;
    let key = SealKey::from_slice(&target.key.key_bytes()?)?;

    let resp = Client::new()
        .get(format!("{}/load", target.origin))
        .query(&[("id", target.key.id.as_str())])
        .send()
        .await
        .context("HTTP request failed")?;
    let reply: LoadReply = parse_reply(resp).await?;

    let ciphertext = base58::decode(&reply.encrypted).context("ciphertext is not base-58")?;
    let iv = base58::decode(&reply.iv).context("iv is not base-58")?;
    let plaintext = cipher::decrypt(&key, &ciphertext, &iv)?;
    let card: CardData = serde_json::from_slice(&plaintext).context("decode card")?;

    println!("Cardholder: {}", card.cardholder_name);
    println!("Number:     {}", card.card_number);
    println!("Expires:    {}", card.expiry_date);
    println!("CVV:        {}", card.cvv);
    match reply.remaining_reads {
        Some(0) => println!("This link has now been destroyed."),
        Some(n) => println!("This link can be opened {n} more time(s)."),
        None => {}
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Where to load a secret from, and the key to open it with.
#[derive(Debug)]
struct ShareTarget {
    origin: String,
    key: CompositeKey,
}

impl ShareTarget {
    /// Accepts a full share link or a bare composite key (loaded from
    /// `default_server`). A link's path id must match the key's id.
    fn parse(link: &str, default_server: &str) -> Result<Self> {
        let link = link.trim();
        let Some((url, fragment)) = link.split_once('#') else {
            return Ok(Self {
                origin: default_server.trim_end_matches('/').to_owned(),
                key: composite::decode(link)?,
            });
        };

        let key = composite::decode(fragment)?;
        let (origin, path_id) = url
            .rsplit_once("/unseal/")
            .context("link must look like <origin>/unseal/<id>#<key>")?;
        if path_id.trim_end_matches('/') != key.id {
            anyhow::bail!("ID mismatch between link and key");
        }
        Ok(Self {
            origin: origin.to_owned(),
            key,
        })
    }
}

/// Parse a TTL such as `24h` into whole hours. `0`/`none` means no expiry.
fn parse_ttl_hours(s: &str) -> Result<Option<u32>> {
    if matches!(s.trim(), "0" | "none" | "never") {
        return Ok(None);
    }
    let d: humantime::Duration = s
        .trim()
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    let hours = d.as_secs().div_ceil(3600);
    let hours = u32::try_from(hours).context("ttl too large")?;
    Ok((hours > 0).then_some(hours))
}

/// Parse a read limit. `unlimited` (or `0`) means no limit.
fn parse_reads(s: &str) -> Result<Option<u32>> {
    match s.trim() {
        "unlimited" | "0" => Ok(None),
        n => {
            let n: u32 = n
                .parse()
                .with_context(|| format!("invalid read count: {s}"))?;
            Ok(Some(n))
        }
    }
}

async fn parse_reply<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.context("parse response");
    }
    let json: Value = resp.json().await.unwrap_or_default();
    anyhow::bail!(
        "server returned {status}: {}",
        json["error"].as_str().unwrap_or("unknown error")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_parsing() {
        assert_eq!(parse_ttl_hours("1h").unwrap(), Some(1));
        assert_eq!(parse_ttl_hours("90m").unwrap(), Some(2));
        assert_eq!(parse_ttl_hours("7d").unwrap(), Some(168));
        assert_eq!(parse_ttl_hours("none").unwrap(), None);
        assert!(parse_ttl_hours("soon").is_err());
    }

    #[test]
    fn reads_parsing() {
        assert_eq!(parse_reads("1").unwrap(), Some(1));
        assert_eq!(parse_reads("unlimited").unwrap(), None);
        assert_eq!(parse_reads("0").unwrap(), None);
        assert!(parse_reads("-3").is_err());
    }

    #[test]
    fn share_target_from_link() {
        let key = CompositeKey::new("AbCdEfGhJkMnPqRsTuVwXy", &[9u8; 32]);
        let link = format!("https://cards.example/unseal/{}#{key}", key.id);
        let target = ShareTarget::parse(&link, "http://localhost:8080").unwrap();
        assert_eq!(target.origin, "https://cards.example");
        assert_eq!(target.key, key);
    }

    #[test]
    fn share_target_from_bare_key() {
        let key = CompositeKey::new("AbCdEfGhJkMnPqRsTuVwXy", &[9u8; 32]);
        let target = ShareTarget::parse(&key.to_string(), "http://localhost:8080/").unwrap();
        assert_eq!(target.origin, "http://localhost:8080");
        assert_eq!(target.key.id, key.id);
    }

    #[test]
    fn share_target_id_mismatch() {
        let key = CompositeKey::new("AbCdEfGhJkMnPqRsTuVwXy", &[9u8; 32]);
        let link = format!("https://cards.example/unseal/SomethingElse#{key}");
        let err = ShareTarget::parse(&link, "http://localhost:8080").unwrap_err();
        assert!(err.to_string().contains("ID mismatch"));
    }

    #[test]
    fn share_target_bad_key() {
        assert!(ShareTarget::parse("https://x/unseal/id#not.enough", "http://x").is_err());
    }
}
