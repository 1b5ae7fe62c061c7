use anyhow::{Context, Result, bail};
use rjunos::catalog::TableCatalog;
use rjunos::rpc::RpcArgs;
use rjunos::session::{RecordLevel, RecordingSession, RpcRecorder, Session, StaticSession};
use std::env;
use std::fs;
use std::sync::Arc;

const CATALOG: &str = r#"
tables:
  ProxyArpTable:
    rpc: get-config
    item: security/nat/proxy-arp/interface
    view: ProxyArpView
views:
  ProxyArpView:
    fields:
      interface: name
      address: address/name
"#;

const REPLY: &str = r#"<configuration>
  <security><nat><proxy-arp>
    <interface>
      <name>ge-0/0/1.124</name>
      <address><name>198.18.11.5/32</name></address>
    </interface>
  </proxy-arp></nat></security>
</configuration>"#;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (interface, record_to) = match args.as_slice() {
        [] => ("ge-0/0/1.124".to_string(), None),
        [interface] => (interface.clone(), None),
        [interface, flag, path] if flag == "--record" => (interface.clone(), Some(path.clone())),
        _ => bail!("usage: cargo run --example proxy_arp -- [interface] [--record <out.jsonl>]"),
    };

    let device = StaticSession::new("vsrx_cyan").with_reply("get-config", REPLY);
    let recording = RecordingSession::new(device, RpcRecorder::new(RecordLevel::Full));
    let recorder = recording.recorder().clone();
    let session: Arc<dyn Session> = Arc::new(recording);

    let catalog = TableCatalog::from_yaml(CATALOG)?;
    let mut entries = catalog.table("ProxyArpTable", session)?;
    entries.fetch(&RpcArgs::new())?;
    println!("{entries}");

    match entries.get(interface.as_str())? {
        Some(entry) => {
            let fields = entry.as_view().context("view configured")?.items();
            println!("entry exists: {fields:?}");
        }
        None => println!("no proxy-arp entry for {interface}"),
    }

    if let Some(path) = record_to {
        fs::write(&path, recorder.to_jsonl()?).with_context(|| format!("writing {path}"))?;
        println!("recording written to {path}");
    }
    Ok(())
}
