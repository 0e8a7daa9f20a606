use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::io::BufWriter;
use std::path::PathBuf;

use ftserve::cli::ClientOpts;
use ftserve::client::{request_file, request_listing, ClientRequest, ServerReply};
use ftserve::command::Verb;

fn main() {
    let opts = match ClientOpts::try_parse() {
        Ok(o) => o,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 2,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    let req = match opts.request() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(&req, opts.output) {
        if let Some(reply) = e.downcast_ref::<ServerReply>() {
            eprintln!("{}:{} says {}", req.host, req.port, reply);
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn run(req: &ClientRequest, output: Option<PathBuf>) -> Result<()> {
    match req.verb {
        Verb::List => {
            for name in request_listing(req)? {
                println!("{}", name);
            }
        }
        Verb::Get => {
            let name = req.filename.as_deref().unwrap_or_default();
            let dest = output.unwrap_or_else(|| PathBuf::from(name));
            if dest.exists() {
                bail!("{} already exists; pass --output to save elsewhere", dest.display());
            }
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&dest)
                .with_context(|| format!("create {}", dest.display()))?;
            let mut out = BufWriter::new(file);
            match request_file(req, &mut out) {
                Ok(bytes) => println!("Received {} ({} bytes)", dest.display(), bytes),
                Err(e) => {
                    drop(out);
                    let _ = fs::remove_file(&dest);
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}
