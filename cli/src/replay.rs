use anyhow::Context;
use coco_taxonomy::CoCo;
use coco_taxonomy::Item;
use coco_taxonomy::PropertyMap;
use coco_taxonomy::Record;
use coco_taxonomy::render_plain;
use serde_json::Value;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;

/// Outcome of feeding a message log into a registry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub failed: usize,
}

/// Applies every line of a JSONL message log to `coco`, in order.
///
/// Lines that are not JSON always abort. Messages the registry rejects
/// abort only when `strict` is set; otherwise they are logged and counted.
pub fn load_stream(coco: &CoCo, path: &Path, strict: bool) -> anyhow::Result<ReplayStats> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut stats = ReplayStats::default();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let lineno = idx + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let message: Value = serde_json::from_str(&line)
            .with_context(|| format!("line {lineno}: invalid JSON"))?;
        match coco.update_coco(message) {
            Ok(()) => stats.applied += 1,
            Err(e) if strict => {
                return Err(anyhow::Error::new(e).context(format!("line {lineno}")));
            }
            Err(e) => {
                tracing::warn!("line {lineno}: {e}");
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

fn write_values(
    coco: &CoCo,
    out: &mut impl Write,
    schema: &PropertyMap,
    values: &Record,
) -> std::io::Result<()> {
    for (name, value) in values {
        let text = match schema.get(name) {
            Some(prop) => coco.render_or_raw(prop, value),
            None => render_plain(value),
        };
        writeln!(out, "  {name} = {text}")?;
    }
    Ok(())
}

fn write_item(coco: &CoCo, out: &mut impl Write, item: &Item) -> std::io::Result<()> {
    let types: Vec<String> = item.types().iter().map(|t| t.name().to_string()).collect();
    write!(out, "item {}", item.id())?;
    let label = item.to_display_string();
    if label != item.id() {
        write!(out, " \"{label}\"")?;
    }
    writeln!(out, " : {}", types.join(", "))?;
    if let Some(properties) = item.properties() {
        write_values(coco, out, &item.static_properties(), &properties)?;
    }
    if let Some(datum) = item.datum() {
        writeln!(out, "  @ {}", datum.timestamp)?;
        write_values(coco, out, &item.dynamic_properties(), &datum.data)?;
    }
    Ok(())
}

/// Writes every type (with its schema) followed by every item (with its
/// rendered static values and current datum).
pub fn write_report(coco: &CoCo, out: &mut impl Write) -> std::io::Result<()> {
    for tp in coco.types() {
        writeln!(out, "type {tp}")?;
    }
    for item in coco.items() {
        write_item(coco, out, &item)?;
    }
    Ok(())
}
