use anyhow::{Context, Result, bail};
use rjunos::session::{NormalizeOptions, Rpc, RpcRecorder, RpcReplayer};
use std::env;
use std::fs;

const USAGE: &str = "usage: cargo run --example normalize_recording -- \
<input.jsonl> <output.jsonl> [--keep-errors] [--keep-timestamps]";

fn parse_args(args: &[String]) -> Result<(&str, &str, NormalizeOptions)> {
    let [input, output, flags @ ..] = args else {
        bail!(USAGE);
    };
    let mut options = NormalizeOptions::default();
    for flag in flags {
        match flag.as_str() {
            "--keep-errors" => options.keep_errors = true,
            "--keep-timestamps" => options.strip_timestamps = false,
            other => bail!("unknown flag {other}\n{USAGE}"),
        }
    }
    Ok((input.as_str(), output.as_str(), options))
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (input, output, options) = parse_args(&args)?;

    let raw = fs::read_to_string(input).with_context(|| format!("reading {input}"))?;
    let normalized = RpcRecorder::normalize_jsonl(&raw, options)?;
    fs::write(output, &normalized).with_context(|| format!("writing {output}"))?;

    // Replay the result once to show it still drives a session.
    let exchanges = RpcRecorder::from_jsonl(&normalized)?.entries()?;
    let replayer = RpcReplayer::from_jsonl(&normalized)?;
    let rpc = Rpc::new(&replayer);
    for exchange in &exchanges {
        let request = &exchange.request;
        match rpc.call(&request.rpc, &request.args) {
            Ok(doc) => println!("{} -> <{}>", request.tag(), doc.root().name()),
            Err(err) => println!("{} -> error: {err}", request.tag()),
        }
    }
    println!(
        "{} exchanges written to {output}, {} left unreplayed",
        exchanges.len(),
        replayer.remaining()?
    );
    Ok(())
}
