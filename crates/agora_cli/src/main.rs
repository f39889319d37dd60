use std::io::Read;
use std::path::PathBuf;

use agora_crypto::AgentKeyPair;
use agora_e2ee::SessionConfig;
use agora_proto::{EnvelopeBuilder, EnvelopeSigner, EnvelopeVerifier, MessageType};
use agora_relay::{AgentRuntime, RelayClient, RelayConfig, SubscribeOptions};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

const SECRET_KEY_ENV: &str = "AGORA_SECRET_KEY";

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Operator CLI for Agora agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new Ed25519 agent identity
    Keygen,

    /// Print the did:key of a secret key
    Did {
        /// Hex secret key (falls back to AGORA_SECRET_KEY)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Build and sign an envelope, printing it as JSON
    Sign {
        #[arg(short, long)]
        key: Option<String>,

        /// Message type, e.g. REQUEST (any case)
        #[arg(short = 't', long = "type", value_parser = parse_message_type)]
        kind: MessageType,

        /// Payload as a JSON object
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Recipient did:key
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        thread: Option<String>,
    },

    /// Verify a signed envelope read from a file or stdin
    Verify {
        /// Defaults to stdin
        file: Option<PathBuf>,
    },

    /// Follow messages on the relay
    Tail {
        /// Decrypt with this key; also filters to messages for its DID
        #[arg(short, long)]
        key: Option<String>,

        /// Relay base URL (falls back to AGORA_RELAY_URL)
        #[arg(long)]
        relay: Option<String>,

        #[arg(long)]
        recipient: Option<String>,

        #[arg(long)]
        sender: Option<String>,

        /// Start cursor; defaults to now
        #[arg(long)]
        since: Option<String>,
    },
}

fn parse_message_type(s: &str) -> Result<MessageType, String> {
    s.to_ascii_uppercase().parse().map_err(|e: agora_proto::ProtoError| e.to_string())
}

fn load_secret(key: Option<String>) -> Result<Vec<u8>> {
    let encoded = match key {
        Some(k) => k,
        None => std::env::var(SECRET_KEY_ENV)
            .map_err(|_| anyhow!("no key given and {SECRET_KEY_ENV} is not set"))?,
    };
    hex::decode(encoded.trim()).context("secret key must be hex")
}

fn read_input(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn sign(
    secret: &[u8],
    kind: MessageType,
    payload: &str,
    to: Option<String>,
    thread: Option<String>,
) -> Result<Value> {
    let signer = EnvelopeSigner::new(secret)?;
    let payload: Value = serde_json::from_str(payload).context("payload is not JSON")?;
    if !payload.is_object() {
        bail!("payload must be a JSON object");
    }
    let mut builder = EnvelopeBuilder::new()
        .id(uuid::Uuid::new_v4().to_string())
        .kind(kind)
        .sender_id(signer.did())
        .payload(payload);
    if let Some(to) = to {
        builder = builder.recipient_id(to);
    }
    if let Some(thread) = thread {
        builder = builder.thread(thread, None);
    }
    let signed = signer.sign_sync(builder.build()?)?;
    Ok(serde_json::to_value(signed)?)
}

async fn tail(
    key: Option<String>,
    relay: Option<String>,
    options: SubscribeOptions,
) -> Result<()> {
    let mut config = RelayConfig::from_env();
    if let Some(url) = relay {
        config.base_url = url;
    }
    let client = RelayClient::new(config)?;

    // Without a key, envelopes are only verified; ciphertext is printed as is.
    let runtime = match key {
        Some(k) => Some(AgentRuntime::new(
            &load_secret(Some(k))?,
            SessionConfig::default(),
            client.clone(),
        )?),
        None => None,
    };
    let mut stream = match &runtime {
        Some(rt) => rt.subscribe_inbox(options),
        None => client.subscribe_messages(options),
    };
    let verifier = EnvelopeVerifier::new();

    while let Some(batch) = stream.next().await {
        for raw in batch {
            let line = match &runtime {
                Some(rt) => match rt.open_envelope(&raw) {
                    Ok(opened) => json!({
                        "envelope": opened.envelope,
                        "encrypted": opened.was_encrypted,
                        "verified": true,
                    }),
                    Err(e) => {
                        tracing::warn!(target: "agora", event = "open_failed", error = %e);
                        json!({ "envelope": raw, "verified": false, "error": e.to_string() })
                    }
                },
                None => {
                    let verified = verifier.verify_json(&raw);
                    json!({ "envelope": raw, "verified": verified })
                }
            };
            println!("{}", serde_json::to_string(&line)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=info,agora_relay=info,agora_e2ee=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => {
            let key_pair = AgentKeyPair::generate();
            let out = json!({
                "did": key_pair.did(),
                "publicKey": key_pair.public.to_b64(),
                "secretKey": hex::encode(key_pair.secret_bytes()),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Did { key } => {
            let key_pair = AgentKeyPair::from_secret_bytes(&load_secret(key)?)?;
            println!("{}", key_pair.did());
        }

        Commands::Sign {
            key,
            kind,
            payload,
            to,
            thread,
        } => {
            let signed = sign(&load_secret(key)?, kind, &payload, to, thread)?;
            println!("{}", serde_json::to_string_pretty(&signed)?);
        }

        Commands::Verify { file } => {
            let input = read_input(file)?;
            let raw: Value = serde_json::from_str(&input).context("input is not JSON")?;
            if EnvelopeVerifier::new().verify_json(&raw) {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }

        Commands::Tail {
            key,
            relay,
            recipient,
            sender,
            since,
        } => {
            let options = SubscribeOptions {
                since,
                recipient,
                sender,
                ..SubscribeOptions::default()
            };
            tail(key, relay, options).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_output_verifies() {
        let key_pair = AgentKeyPair::generate();
        let signed = sign(
            key_pair.secret_bytes(),
            MessageType::Request,
            r#"{"intent":"summarize"}"#,
            None,
            Some("t-1".into()),
        )
        .unwrap();
        assert_eq!(signed["sender"]["id"], key_pair.did());
        assert_eq!(signed["thread"]["id"], "t-1");
        assert!(EnvelopeVerifier::new().verify_json(&signed));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let key_pair = AgentKeyPair::generate();
        let err = sign(key_pair.secret_bytes(), MessageType::Status, "[1,2]", None, None)
            .unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn secret_must_be_hex() {
        assert!(load_secret(Some("not-hex".into())).is_err());
        let bytes = load_secret(Some("00ff".into())).unwrap();
        assert_eq!(bytes, vec![0x00, 0xff]);
    }

    #[test]
    fn cli_parses_message_type() {
        let cli = Cli::try_parse_from(["agora", "sign", "--type", "request", "-k", "00"]).unwrap();
        match cli.command {
            Commands::Sign { kind, .. } => assert_eq!(kind, MessageType::Request),
            _ => panic!("expected sign"),
        }
        assert!(Cli::try_parse_from(["agora", "sign", "--type", "ping"]).is_err());
    }
}
