use anyhow::{anyhow, bail, Result};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use fssnap::device::BlockDevice;
use fssnap::image;
use fssnap::inode::InodeType;
use fssnap::metrics;
use fssnap::util::display_text;
use fssnap::{Geometry, SnapConfig, SnapshotStore};

use crate::util::{load_in_memory, open_image, parse_fill_size, pattern_bytes, read_all};

/// CLI: session — сценарий команд над одним образом и одним слотом снапшота.
///
/// Slot state lives only for the duration of this process: `snap` then `restore`
/// must appear in the same session.
///
/// Примеры:
///   fssnap session --path fs.img --cmd "snap base; rm testfile.txt; restore; ls"
///   fssnap session --path fs.img --script steps.txt --in-memory --json
pub fn exec(
    path: PathBuf,
    script: Option<PathBuf>,
    cmds: Vec<String>,
    in_memory: bool,
    json: bool,
) -> Result<()> {
    let cfg = SnapConfig::from_env();

    let mut lines: Vec<String> = Vec::new();
    if let Some(p) = script.as_ref() {
        let bytes = read_all(p)?;
        let text = String::from_utf8(bytes).map_err(|_| anyhow!("script is not UTF-8"))?;
        lines.extend(text.lines().map(|l| l.to_string()));
    }
    for c in &cmds {
        lines.extend(c.split(';').map(|l| l.to_string()));
    }
    if lines.iter().all(|l| l.trim().is_empty()) {
        bail!("no commands (use --script or --cmd)");
    }

    let mut dev: Box<dyn BlockDevice> = if in_memory {
        Box::new(load_in_memory(&path, &cfg)?)
    } else {
        open_image(&path, &cfg)?
    };

    let mut store = SnapshotStore::new(&cfg);
    store.add_invalidation_hook(Arc::new(|g: &Geometry| {
        info!(
            "session: caches invalidated (inodes at {}, bitmap at {})",
            g.inodestart, g.bmapstart
        );
    }));

    for (n, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        run_line(dev.as_mut(), &store, line, json)
            .map_err(|e| e.context(format!("command {} '{}'", n + 1, line)))?;
    }
    dev.flush()?;
    Ok(())
}

fn run_line(dev: &mut dyn BlockDevice, store: &SnapshotStore, line: &str, json: bool) -> Result<()> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    match cmd {
        "ls" => {
            let dir = if rest.is_empty() { "/" } else { rest };
            let entries = image::list_dir(dev, dir)?;
            if json {
                let v: Vec<_> = entries
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "name": e.name,
                            "inum": e.inum,
                            "kind": kind_str(e.kind),
                            "size": e.size,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string(&v)?);
            } else {
                for e in entries {
                    println!("{:<14} {:>4} {:<6} {}", e.name, e.inum, kind_str(e.kind), e.size);
                }
            }
        }
        "write" => {
            let (p, text) = rest
                .split_once(char::is_whitespace)
                .map(|(p, t)| (p, t.trim_start()))
                .unwrap_or((rest, ""));
            if p.is_empty() {
                bail!("usage: write <path> <text>");
            }
            let inum = image::write_file(dev, p, text.as_bytes())?;
            println!("wrote {} ({} B, inode {})", p, text.len(), inum);
        }
        "fill" => {
            let (p, n) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: fill <path> <bytes>"))?;
            let n = parse_fill_size(n)?;
            let inum = image::write_file(dev, p, &pattern_bytes(n))?;
            println!("wrote {} ({} B, inode {})", p, n, inum);
        }
        "cat" => {
            let data = image::read_file(dev, rest)?;
            println!("{}", display_text(&data));
        }
        "rm" => {
            image::unlink(dev, rest)?;
            println!("removed {}", rest);
        }
        "mkdir" => {
            let inum = image::mkdir(dev, rest)?;
            println!("created {} (inode {})", rest, inum);
        }
        "snap" => {
            let label = if rest.is_empty() { "session" } else { rest };
            let s = store.capture(dev, label)?;
            if json {
                println!("{}", serde_json::to_string(&s)?);
            } else {
                println!("Filesystem snapshot created successfully.");
                let t = s.truncated();
                if !t.is_empty() {
                    let names: Vec<&str> = t.iter().map(|c| c.as_str()).collect();
                    println!("warning: truncated categories: {}", names.join(", "));
                }
            }
        }
        "restore" => {
            let st = store.restore(dev)?;
            if json {
                println!("{}", serde_json::to_string(&st)?);
            } else {
                println!("Filesystem restored successfully.");
            }
        }
        "info" => match store.info() {
            Some(s) if json => println!("{}", serde_json::to_string(&s)?),
            Some(s) => {
                println!("snapshot '{}' ({} blocks)", s.label, s.total_blocks());
                for c in &s.categories {
                    println!(
                        "  {:<12} blocks={} map={} truncated={}",
                        c.category.as_str(),
                        c.blocks,
                        c.map_len.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                        c.truncated
                    );
                }
            }
            None if json => println!("null"),
            None => println!("no snapshot"),
        },
        "verify" => {
            let r = store.verify(dev)?;
            if json {
                println!("{}", serde_json::to_string(&r)?);
            } else if r.is_clean() {
                println!("verify: OK ({} blocks)", r.blocks_checked);
            } else {
                println!(
                    "verify: {} of {} blocks differ",
                    r.mismatches.len(),
                    r.blocks_checked
                );
                for m in &r.mismatches {
                    println!("  {} block {}", m.category.as_str(), m.blockno);
                }
            }
        }
        "clear" => {
            let had = store.clear();
            println!("{}", if had { "snapshot released" } else { "no snapshot" });
        }
        "metrics" => {
            let ms = metrics::snapshot();
            if json {
                println!("{}", serde_json::to_string(&ms)?);
            } else {
                println!(
                    "captures={}/{} restores={}/{} rollbacks={} truncations={}",
                    ms.captures_ok,
                    ms.captures_failed,
                    ms.restores_ok,
                    ms.restores_failed,
                    ms.rollbacks,
                    ms.truncations
                );
            }
        }
        other => bail!("unknown command '{}'", other),
    }
    Ok(())
}

fn kind_str(k: InodeType) -> &'static str {
    match k {
        InodeType::Free => "free",
        InodeType::Dir => "dir",
        InodeType::File => "file",
        InodeType::Device => "dev",
        InodeType::Unknown(_) => "?",
    }
}
