//! Main tracking mode command.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use rigscope::{CachedEntity, MemoryReader, ProcessHandle, Snapshot, SnapshotDiff, Tracker};
use tracing::{debug, info, warn};

use crate::config::CliConfig;
use crate::shutdown::ShutdownSignal;

/// Delay between attach attempts while the process is absent
const REATTACH_DELAY: Duration = Duration::from_secs(5);

/// Consecutive failed ticks between repeated warnings
const WARN_EVERY: u32 = 50;

/// Run the tracking mode until Ctrl-C
pub fn run(config: &CliConfig, json: bool) -> Result<()> {
    let shutdown = ShutdownSignal::install()?;

    info!("rigscope {}", env!("CARGO_PKG_VERSION"));
    let tracker_config = config.tracker_config();
    let interval = tracker_config.tick_interval;
    let mut tracker = Tracker::with_config(config.offset_table()?, tracker_config);

    info!("Waiting for {}... (Ctrl-C to quit)", config.process_name);
    while !shutdown.is_shutdown() {
        match ProcessHandle::attach(&config.process_name) {
            Ok(process) => {
                info!(
                    "Attached to {} (pid {}, base {:#x})",
                    process.name, process.pid, process.base_address
                );
                track(&process, &mut tracker, &shutdown, interval, json)?;
                tracker.reset();
                info!("Process disconnected, waiting for reattach...");
            }
            Err(e) if e.is_attach_failure() => debug!("{}", e),
            Err(e) => return Err(e.into()),
        }

        if shutdown.wait(REATTACH_DELAY) {
            break;
        }
    }

    info!("Stopped after {} ticks", tracker.tick_count());
    Ok(())
}

/// Tick until the process goes away or shutdown is requested
fn track(
    process: &ProcessHandle,
    tracker: &mut Tracker,
    shutdown: &ShutdownSignal,
    interval: Duration,
    json: bool,
) -> Result<()> {
    let reader = MemoryReader::new(process);
    let mut out = io::stdout().lock();
    let mut failures = 0u32;

    while !shutdown.is_shutdown() {
        if !reader.is_alive(process.base_address) {
            info!("Process terminated");
            break;
        }

        match tracker.tick(&reader, process.base_address) {
            Ok(diff) => {
                failures = 0;
                if json {
                    serde_json::to_writer(&mut out, tracker.snapshot())?;
                    writeln!(out)?;
                } else if !diff.is_empty() {
                    write_changes(&mut out, tracker.snapshot(), &diff)?;
                }
            }
            Err(e) => {
                // The scene is not loaded yet, or is being torn down
                if failures % WARN_EVERY == 0 {
                    warn!("Tick failed: {}", e);
                }
                failures += 1;
            }
        }

        if shutdown.wait(interval) {
            break;
        }
    }

    Ok(())
}

/// One line per joined or changed entity
fn write_changes<W: Write>(out: &mut W, snapshot: &Snapshot, diff: &SnapshotDiff) -> io::Result<()> {
    for (tag, keys) in [("+", &diff.joined), ("~", &diff.changed)] {
        for entity in keys.iter().filter_map(|key| snapshot.get(*key)) {
            writeln!(out, "[{}] {} {}", snapshot.tick, tag, describe(entity))?;
        }
    }
    for key in &diff.left {
        writeln!(out, "[{}] - {}", snapshot.tick, key)?;
    }
    Ok(())
}

fn describe(entity: &CachedEntity) -> String {
    let rig = entity
        .rig_kind
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "?".to_string());
    let mut line = format!(
        "{} [{}] {:.0}/{:.0}",
        entity.name, rig, entity.health, entity.max_health
    );
    if let Some(distance) = entity.distance {
        line.push_str(&format!(" {:.1}m", distance));
    }
    if let Some(tool) = &entity.tool {
        line.push_str(&format!(" holding {}", tool.name));
    }
    if entity.local_player {
        line.push_str(" (you)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigscope::{InstanceId, RigKind};

    fn entity(character: u64, name: &str) -> CachedEntity {
        let mut entity = CachedEntity::new(InstanceId(character));
        entity.name = name.to_string();
        entity.rig_kind = Some(RigKind::R15);
        entity.health = 75.0;
        entity.max_health = 100.0;
        entity
    }

    #[test]
    fn test_describe() {
        let mut e = entity(0x1000, "alice");
        assert_eq!(describe(&e), "alice [R15] 75/100");

        e.distance = Some(12.345);
        e.local_player = true;
        e.rig_kind = None;
        assert_eq!(describe(&e), "alice [?] 75/100 12.3m (you)");
    }

    #[test]
    fn test_write_changes() {
        let snapshot = Snapshot::new(7, vec![entity(0x1000, "alice"), entity(0x2000, "bob")]);
        let diff = SnapshotDiff {
            joined: vec![InstanceId(0x2000)],
            left: vec![InstanceId(0x3000)],
            changed: vec![InstanceId(0x1000)],
        };

        let mut out = Vec::new();
        write_changes(&mut out, &snapshot, &diff).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "[7] + bob [R15] 75/100\n[7] ~ alice [R15] 75/100\n[7] - 0x3000\n"
        );
    }
}
