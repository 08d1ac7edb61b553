//! Tree command implementation.
//!
//! Attaches once and prints the instance tree below the data model, one
//! instance per line as `name  class  address`.

use std::io::{self, Write};

use anyhow::Result;
use owo_colors::OwoColorize;
use rigscope::memory::MemoryAccess;
use rigscope::{Instance, MemoryReader, ProcessHandle, Remote, resolve_roots};

use crate::config::CliConfig;

/// Run the tree command
pub fn run(config: &CliConfig, depth: usize, color: bool) -> Result<()> {
    let offsets = config.offset_table()?;
    let process = ProcessHandle::attach(&config.process_name)?;
    println!(
        "Attached to {} (PID: {}, Base: 0x{:X})",
        process.name, process.pid, process.base_address
    );

    let reader = MemoryReader::new(&process);
    let remote = Remote::new(&reader, &offsets).with_max_children(config.max_children);
    let roots = resolve_roots(remote, process.base_address)?;
    println!(
        "Place {} / Game {}",
        roots.data_model.place_id(),
        roots.data_model.game_id()
    );
    println!();

    let mut out = io::stdout().lock();
    let count = write_tree(&mut out, *roots.data_model, depth, color)?;
    writeln!(out)?;
    writeln!(out, "{} instances", count)?;
    if reader.degraded_reads() > 0 {
        writeln!(out, "{} reads came back short", reader.degraded_reads())?;
    }
    Ok(())
}

/// Write `root` and its descendants down to `depth`, returning the count
pub fn write_tree<M: MemoryAccess, W: Write>(
    out: &mut W,
    root: Instance<'_, M>,
    depth: usize,
    color: bool,
) -> io::Result<usize> {
    let mut count = 0;
    for (level, instance) in root.descendants(depth) {
        let indent = "  ".repeat(level);
        let name = instance.name();
        let class_name = instance.class_name();
        if color {
            writeln!(
                out,
                "{}{}  {}  {}",
                indent,
                name.bold(),
                class_name.cyan(),
                instance.id().dimmed()
            )?;
        } else {
            writeln!(out, "{}{}  {}  {}", indent, name, class_name, instance.id())?;
        }
        count += 1;
    }
    Ok(count)
}
