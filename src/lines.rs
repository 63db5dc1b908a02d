//! Streaming line source for stdin-style path lists.

use std::io::{BufRead, BufReader, Read};
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, warn};

/// Spawns a reader thread that yields newline-delimited lines from `r` on
/// a rendezvous channel.
///
/// The stream ends at EOF or at the first empty line, whichever comes
/// first; the channel closes when the reader stops. The reader also stops
/// on its own once every receiver is gone, so an early-exiting consumer
/// does not strand it.
pub(crate) fn read_lines<R: Read + Send + 'static>(r: R) -> Receiver<String> {
    let (tx, rx) = bounded(0);
    let spawned = thread::Builder::new()
        .name("line-source".into())
        .spawn(move || {
            let reader = BufReader::new(r);
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        debug!(error = %err, "stopping line source on read error");
                        break;
                    }
                };
                if line.is_empty() {
                    break;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        // The closure was dropped with its sender, so the receiver just
        // reports an empty stream.
        warn!(error = %err, "failed to spawn line source");
    }
    rx
}
