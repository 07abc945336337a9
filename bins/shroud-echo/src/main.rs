//! Encrypted echo utility for exercising cipher channels by hand.
//!
//! Generate a key once, then run a listener and a client against it:
//!
//! ```text
//! shroud-echo --gen-key
//! shroud-echo --listen 127.0.0.1:4040 --key <BASE64>
//! shroud-echo --connect 127.0.0.1:4040 --key <BASE64>
//! ```
//!
//! Both directions use the shared key, matching the simplest deployment.

#![forbid(unsafe_code)]

use std::io::{self, BufRead, Read, Write};
use std::net::{TcpListener, TcpStream};

use anyhow::{bail, Context, Result};
use clap::Parser;
use shroud_core::{ChannelKeys, RecordKey};
use shroud_stream::CipherChannel;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shroud-echo")]
#[command(about = "Encrypted echo server and client")]
struct Args {
    /// Accept one connection on this address and echo records back
    #[arg(long, conflicts_with = "connect")]
    listen: Option<String>,

    /// Connect to an echo server and send stdin lines
    #[arg(long)]
    connect: Option<String>,

    /// Shared base64 key for both directions (see --gen-key)
    #[arg(long, env = "SHROUD_KEY")]
    key: Option<String>,

    /// Print a fresh base64 key and exit
    #[arg(long)]
    gen_key: bool,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    if args.gen_key {
        println!("{}", RecordKey::generate().to_base64());
        return Ok(());
    }

    let key = match args.key.as_deref() {
        Some(encoded) => RecordKey::from_base64(encoded).context("invalid --key")?,
        None => bail!("--key is required (generate one with --gen-key)"),
    };
    let keys = ChannelKeys::shared(key);

    match (args.listen.as_deref(), args.connect.as_deref()) {
        (Some(addr), _) => serve(addr, &keys),
        (_, Some(addr)) => client(addr, &keys),
        _ => bail!("pass --listen ADDR or --connect ADDR"),
    }
}

fn serve(addr: &str, keys: &ChannelKeys) -> Result<()> {
    let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");
    let (stream, peer) = listener.accept()?;
    info!(%peer, "accepted connection");

    let channel = CipherChannel::new(stream, keys)?;
    let (mut rx, mut tx) = channel.split();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = rx.read(&mut buf)?;
        if n == 0 {
            info!("peer closed, done");
            return Ok(());
        }
        debug!(bytes = n, "echoing");
        tx.write_all(&buf[..n])?;
    }
}

fn client(addr: &str, keys: &ChannelKeys) -> Result<()> {
    let stream = TcpStream::connect(addr).with_context(|| format!("connect {addr}"))?;
    let mut channel = CipherChannel::new(stream, keys)?;
    info!(%addr, "connected, type lines to echo");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        channel.write_all(line.as_bytes())?;
        let mut echo = vec![0u8; line.len()];
        channel.read_exact(&mut echo)?;
        println!("{}", String::from_utf8_lossy(&echo));
    }
    channel.close()?;
    Ok(())
}
