use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use log::info;
use wa_wire::binary::stanza::unpack_stanza_with_capacity;
use wa_wire::media::{MediaDescriptor, MediaDownloadReader, MediaKind, MediaUploadReader};
use wa_wire::{decode, encode_stanza, Jid, MutationKeys, Node, WireConfig};

/// Command line tools for the WhatsApp Web wire formats.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Choose a command to run.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a hex stanza and print the node.
    DecodeStanza { hex: String },
    /// Build an iq stanza and print it as hex.
    EncodeIq {
        #[arg(long)]
        id: String,
        #[arg(long = "type")]
        iq_type: String,
        #[arg(long)]
        to: Option<String>,
    },
    /// Encrypt a file for upload and print the descriptor fields.
    EncryptMedia {
        #[arg(long)]
        kind: MediaKind,
        input: PathBuf,
        output: PathBuf,
    },
    /// Verify and decrypt a downloaded media file.
    DecryptMedia {
        #[arg(long)]
        kind: MediaKind,
        /// Base64 media key. Omit for unencrypted kinds.
        #[arg(long)]
        media_key: Option<String>,
        /// Base64 plaintext SHA-256.
        #[arg(long)]
        sha256: Option<String>,
        /// Base64 SHA-256 of the encrypted file.
        #[arg(long)]
        enc_sha256: Option<String>,
        input: PathBuf,
        output: PathBuf,
    },
    /// Print the keys expanded from a hex app-state sync key.
    MutationKeys { sync_key: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => WireConfig::load(path)?,
        None => WireConfig::default(),
    };

    match cli.command {
        Commands::DecodeStanza { hex } => {
            let stanza = hex::decode(hex.trim())?;
            let payload = unpack_stanza_with_capacity(&stanza, config.inflate_initial_capacity)?;
            println!("{}", decode(&payload)?);
        }
        Commands::EncodeIq { id, iq_type, to } => {
            let mut node = Node::new("iq").with_attr("id", id).with_attr("type", iq_type);
            if let Some(to) = to {
                node.set_attr("to", to.parse::<Jid>()?);
            }
            info!("encoding {}", node);
            println!("{}", hex::encode(encode_stanza(&node)?));
        }
        Commands::EncryptMedia { kind, input, output } => {
            let mut reader = MediaUploadReader::with_buffer_size(File::open(&input)?, kind, config.media_buffer_size)?;
            let mut writer = BufWriter::new(File::create(&output)?);
            let written = io::copy(&mut reader, &mut writer)?;
            writer.flush()?;
            info!("wrote {} bytes to {}", written, output.display());

            let upload = reader.finish()?;
            println!("{}", serde_json::to_string_pretty(&upload)?);
        }
        Commands::DecryptMedia {
            kind,
            media_key,
            sha256,
            enc_sha256,
            input,
            output,
        } => {
            let descriptor = MediaDescriptor {
                media_key: media_key.map(|key| STANDARD.decode(key)).transpose()?,
                file_sha256: sha256.map(|digest| STANDARD.decode(digest)).transpose()?,
                file_enc_sha256: enc_sha256.map(|digest| STANDARD.decode(digest)).transpose()?,
                ..MediaDescriptor::new(kind)
            };
            let file = File::open(&input)?;
            let length = file.metadata()?.len();
            let mut reader = MediaDownloadReader::with_buffer_size(file, length, &descriptor, config.media_buffer_size)?;
            let mut writer = BufWriter::new(File::create(&output)?);
            let written = io::copy(&mut reader, &mut writer)?;
            writer.flush()?;
            reader.close();
            println!("Verified and wrote {} bytes to {}", written, output.display());
        }
        Commands::MutationKeys { sync_key } => {
            let keys = MutationKeys::derive(&hex::decode(sync_key.trim())?)?;
            println!("index:            {}", hex::encode(keys.index_key()?));
            println!("value encryption: {}", hex::encode(keys.value_encryption_key()?));
            println!("value mac:        {}", hex::encode(keys.value_mac_key()?));
            println!("snapshot mac:     {}", hex::encode(keys.snapshot_mac_key()?));
            println!("patch mac:        {}", hex::encode(keys.patch_mac_key()?));
        }
    }

    Ok(())
}
